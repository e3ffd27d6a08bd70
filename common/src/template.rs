use std::{fmt, str::FromStr};

/// Longest name the processor looks for between two `%` signs.
pub const MAX_PLACEHOLDER_LEN: usize = 32;

/// Values the page templates may reference as `%NAME%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    TemperatureC,
    TemperatureF,
    CurrentTime,
}

impl Placeholder {
    pub const ALL: [Placeholder; 3] = [Self::TemperatureC, Self::TemperatureF, Self::CurrentTime];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemperatureC => "TEMPERATUREC",
            Self::TemperatureF => "TEMPERATUREF",
            Self::CurrentTime => "CURRENTTIME",
        }
    }
}

impl FromStr for Placeholder {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|placeholder| placeholder.as_str() == name)
            .ok_or(())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expands `%NAME%` tokens in `template`.
///
/// `%%` is a literal percent sign, so CSS and JavaScript in the templates
/// write `100%%`. Unknown names expand to nothing. A `%` that does not open
/// an identifier of at most `MAX_PLACEHOLDER_LEN` characters closed by
/// another `%` is copied through unchanged.
pub fn render_template<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(Placeholder) -> String,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        if let Some(stripped) = after.strip_prefix('%') {
            out.push('%');
            rest = stripped;
            continue;
        }

        let closing = after
            .char_indices()
            .take(MAX_PLACEHOLDER_LEN + 1)
            .find(|(_, c)| *c == '%')
            .map(|(idx, _)| idx);
        let Some(name) = closing.map(|end| &after[..end]).filter(|name| is_name(name)) else {
            out.push('%');
            rest = after;
            continue;
        };
        if let Ok(placeholder) = name.parse::<Placeholder>() {
            out.push_str(&resolve(placeholder));
        }
        rest = &after[name.len() + 1..];
    }

    out.push_str(rest);
    out
}

fn is_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolver(placeholder: Placeholder) -> String {
        match placeholder {
            Placeholder::TemperatureC => "21.50".to_string(),
            Placeholder::TemperatureF => "70.70".to_string(),
            Placeholder::CurrentTime => "2024-01-18 09:30:00".to_string(),
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let rendered = render_template(
            "<p>%TEMPERATUREC% &deg;C / %TEMPERATUREF% &deg;F at %CURRENTTIME%</p>",
            resolver,
        );

        assert_eq!(
            rendered,
            "<p>21.50 &deg;C / 70.70 &deg;F at 2024-01-18 09:30:00</p>"
        );
    }

    #[test]
    fn double_percent_is_a_literal() {
        assert_eq!(
            render_template("width: 100%%; x = y %% 60;", resolver),
            "width: 100%; x = y % 60;"
        );
    }

    #[test]
    fn unknown_placeholder_expands_to_nothing() {
        assert_eq!(render_template("[%HUMIDITY%]", resolver), "[]");
    }

    #[test]
    fn unterminated_percent_is_copied() {
        assert_eq!(render_template("50% done", resolver), "50% done");
    }

    #[test]
    fn distant_percent_signs_are_not_a_placeholder() {
        let text = "Tank at 50% and the pump ran at 20% today";
        assert_eq!(render_template(text, resolver), text);

        assert_eq!(
            render_template("50% then %TEMPERATUREC%", resolver),
            "50% then 21.50"
        );

        let long = format!("%{}%", "A".repeat(MAX_PLACEHOLDER_LEN + 8));
        assert_eq!(render_template(&long, resolver), long);
    }

    #[test]
    fn names_parse_back_to_variants() {
        for placeholder in Placeholder::ALL {
            assert_eq!(placeholder.as_str().parse::<Placeholder>(), Ok(placeholder));
        }
        assert!("temperaturec".parse::<Placeholder>().is_err());
    }
}
