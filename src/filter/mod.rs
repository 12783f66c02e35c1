//! Instrument symbol filtering
//!
//! Only alerts for the configured instrument are forwarded. TradingView
//! symbols come in many spellings (`NAS100`, `CAPITALCOM:US100`,
//! `NASDAQ:NDX`), so matching is substring containment against a set of
//! aliases rather than equality.


/// Aliases accepted when nothing is configured
pub const DEFAULT_ALIASES: [&str; 4] = ["NAS100", "US100", "NASDAQ", "NDX"];

/// Outcome of a symbol check. Rejection is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Reject,
}

impl FilterDecision {
    pub fn is_accept(self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// Case-insensitive alias substring filter
#[derive(Debug, Clone)]
pub struct SymbolFilter {
    aliases: Vec<String>,
}

impl Default for SymbolFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ALIASES)
    }
}

impl SymbolFilter {
    /// Build a filter. An empty alias set accepts every symbol.
    pub fn new<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let aliases = aliases
            .into_iter()
            .map(|a| a.as_ref().trim().to_uppercase())
            .filter(|a| !a.is_empty())
            .collect();
        Self { aliases }
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn accepts(&self, symbol: &str) -> bool {
        if self.aliases.is_empty() {
            return true;
        }
        let upper = symbol.to_uppercase();
        self.aliases.iter().any(|alias| upper.contains(alias.as_str()))
    }

    pub fn check(&self, symbol: &str) -> FilterDecision {
        if self.accepts(symbol) {
            FilterDecision::Accept
        } else {
            FilterDecision::Reject
        }
    }
}
