//! `WWW-Authenticate` challenge construction.

use super::AuthError;
use http::HeaderValue;

/// A `Bearer` challenge with RFC 6750 and RFC 9728 parameters
#[derive(Debug, Default, Clone)]
pub struct BearerChallenge {
    resource_metadata: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl BearerChallenge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Challenge describing why a presented credential was rejected
    pub fn for_error(error: &AuthError) -> Self {
        let challenge = Self::new()
            .error(error.oauth_error_code())
            .error_description(error.to_string());
        match error {
            AuthError::InsufficientScope { required, .. } => challenge.scope(required.join(" ")),
            _ => challenge,
        }
    }

    pub fn resource_metadata(mut self, url: impl Into<String>) -> Self {
        self.resource_metadata = Some(url.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn error_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    pub fn to_header_string(&self) -> String {
        let params: Vec<String> = [
            ("resource_metadata", &self.resource_metadata),
            ("scope", &self.scope),
            ("error", &self.error),
            ("error_description", &self.error_description),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_ref()
                .map(|value| format!("{name}=\"{}\"", quote(value)))
        })
        .collect();

        if params.is_empty() {
            "Bearer".to_string()
        } else {
            format!("Bearer {}", params.join(" "))
        }
    }

    pub fn to_header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.to_header_string())
            .unwrap_or(HeaderValue::from_static("Bearer"))
    }
}

/// Escapes a quoted-string value; control and non-ASCII characters are dropped
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() || !c.is_ascii() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_challenge() {
        assert_eq!(BearerChallenge::new().to_header_string(), "Bearer");
    }

    #[test]
    fn test_resource_metadata_only() {
        let header = BearerChallenge::new()
            .resource_metadata("https://gw.example/.well-known/oauth-protected-resource")
            .to_header_string();
        assert_eq!(
            header,
            r#"Bearer resource_metadata="https://gw.example/.well-known/oauth-protected-resource""#
        );
    }

    #[test]
    fn test_insufficient_scope_challenge() {
        let err = AuthError::InsufficientScope {
            required: vec!["issues:write".to_string()],
            granted: vec!["issues:read".to_string()],
        };
        let header = BearerChallenge::for_error(&err)
            .resource_metadata("https://gw.example/.well-known/oauth-protected-resource")
            .to_header_string();
        assert!(header.starts_with("Bearer resource_metadata="));
        assert!(header.contains(r#"scope="issues:write""#));
        assert!(header.contains(r#"error="insufficient_scope""#));
    }

    #[test]
    fn test_values_are_escaped() {
        let header = BearerChallenge::new()
            .error("invalid_token")
            .error_description("bad \"kid\" \\ here\n")
            .to_header_string();
        assert_eq!(
            header,
            r#"Bearer error="invalid_token" error_description="bad \"kid\" \\ here""#
        );
        assert!(HeaderValue::from_str(&header).is_ok());
    }

    #[test]
    fn test_parameters_are_space_separated() {
        let header = BearerChallenge::new()
            .resource_metadata("u")
            .scope("s")
            .error("e")
            .error_description("d")
            .to_header_string();
        assert_eq!(
            header,
            r#"Bearer resource_metadata="u" scope="s" error="e" error_description="d""#
        );
    }

    #[test]
    fn test_non_ascii_issuer_keeps_header_readable() {
        let err = AuthError::IssuerNotAllowed("https://idp.exämple".to_string());
        let value = BearerChallenge::for_error(&err).to_header_value();
        let header = value.to_str().expect("challenge should stay visible ASCII");
        assert!(header.contains("https://idp.exmple"));
    }
}
