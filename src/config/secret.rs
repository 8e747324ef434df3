//! Secret string wrapper that never appears in logs.

use serde::Deserialize;

/// The Discord bot token or the Pushover application key.
///
/// `Debug` always prints `[REDACTED]`, so configs and clients holding one can
/// be logged with `?`. There is no `Display`; use [`expose`](Self::expose)
/// where the raw value is needed on the wire.
///
/// # Example
///
/// ```
/// use discord2pushover::config::SecretString;
///
/// let secret = SecretString::new("my-bot-token".to_string());
/// assert_eq!(format!("{:?}", secret), "[REDACTED]");
/// assert_eq!(secret.expose(), "my-bot-token");
/// ```
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a raw secret.
    pub fn new(s: String) -> Self {
        SecretString(s)
    }

    /// The raw value, for request headers and form fields only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecretString::new(s))
    }
}
