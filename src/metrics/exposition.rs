use crate::error::ProbeError;

/// Prometheus text exposition as served on a node's Telegraf port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposition {
    text: String,
}

impl Exposition {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    pub fn missing<'n>(&self, needles: &[&'n str]) -> Vec<&'n str> {
        needles
            .iter()
            .copied()
            .filter(|needle| !self.contains(needle))
            .collect()
    }

    /// Every needle must occur somewhere in the text.
    pub fn require_all(&self, needles: &[&str]) -> Result<(), ProbeError> {
        let missing = self.missing(needles);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProbeError::assertion(format!(
                "metrics not found in Prometheus output: {missing:?}"
            )))
        }
    }

    /// Sample lines; any line containing `#` (HELP, TYPE, comments) is skipped.
    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.text.lines().filter(|line| !line.contains('#'))
    }
}
