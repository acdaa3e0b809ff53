/// Replace `${ENV_VAR}` and `${ENV_VAR:-fallback}` placeholders in raw config text.
///
/// A variable that is unset and has no fallback is left as written, so the
/// parse error (or the literal value) points at the missing variable.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SPOTIFY_CLIENT_SECRET" => Some("s3cret".into()),
            "PORT" => Some("9000".into()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_with("client_secret = \"${SPOTIFY_CLIENT_SECRET}\"", lookup),
            "client_secret = \"s3cret\""
        );
    }

    #[test]
    fn uses_fallback_when_unset() {
        assert_eq!(substitute_with("port = ${ENCORE_PORT:-8081}", lookup), "port = 8081");
        assert_eq!(substitute_with("port = ${PORT:-8081}", lookup), "port = 9000");
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_with("${ENCORE_NONEXISTENT_XYZ}", lookup),
            "${ENCORE_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn keeps_unterminated_placeholder() {
        assert_eq!(substitute_with("a ${PORT", lookup), "a ${PORT");
        assert_eq!(substitute_with("${} x", lookup), "${} x");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
