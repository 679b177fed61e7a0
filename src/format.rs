use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::str::FromStr;

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per item
    #[default]
    Text,
    /// JSON - machine-parseable
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => bail!("Invalid format '{s}'. Use: text or json"),
        }
    }
}

impl OutputFormat {
    /// Serialize data as pretty JSON.
    pub fn to_json<T: Serialize>(data: &T) -> Result<String> {
        serde_json::to_string_pretty(data).context("JSON serialization failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_formats() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        let err = "toon".parse::<OutputFormat>().unwrap_err();
        assert!(err.to_string().contains("Use: text or json"));
    }
}
