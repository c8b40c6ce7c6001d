//! Amount extraction from free-form chat text.
//!
//! Strategies are tried in [`AmountStrategy::PRECEDENCE`] order and the first
//! one that yields a parseable number wins:
//!
//!   "3 кофе за 450р"      -> 450   (currency suffix beats the leading 3)
//!   "Обед 2 человека 1200" -> 1200  (trailing number)
//!   "7 яблок"              -> 7     (first number anywhere)
//!
//! Commas are thousands separators and are stripped; `.` is the decimal point.

use anyhow::Result;
use regex::Regex;

/// Number token: ASCII digits, optional comma groups, optional decimal part.
const NUMBER: &str = r"[0-9][0-9,]*(?:\.[0-9]+)?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountStrategy {
    /// Number immediately followed by ₽ / руб / RUB / р
    CurrencySuffix,
    /// Number closing the message
    TrailingNumber,
    /// First number anywhere
    FirstNumber,
}

impl AmountStrategy {
    pub const PRECEDENCE: [AmountStrategy; 3] = [
        AmountStrategy::CurrencySuffix,
        AmountStrategy::TrailingNumber,
        AmountStrategy::FirstNumber,
    ];
}

/// Compiled patterns for every strategy
#[derive(Debug, Clone)]
pub struct AmountExtractor {
    currency_suffix: Regex,
    trailing_number: Regex,
    first_number: Regex,
}

impl AmountExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            currency_suffix: Regex::new(&format!(r"(?i)({NUMBER})\s*(?:₽|руб|rub|р\b)"))?,
            trailing_number: Regex::new(&format!(r"({NUMBER})[\s.!]*$"))?,
            first_number: Regex::new(&format!(r"({NUMBER})"))?,
        })
    }

    /// Run one strategy in isolation.
    pub fn extract_with(&self, strategy: AmountStrategy, text: &str) -> Option<f64> {
        let re = match strategy {
            AmountStrategy::CurrencySuffix => &self.currency_suffix,
            AmountStrategy::TrailingNumber => &self.trailing_number,
            AmountStrategy::FirstNumber => &self.first_number,
        };
        let caps = re.captures(text.trim())?;
        parse_number(caps.get(1)?.as_str())
    }

    /// First strategy (by precedence) that matches, with the strategy used.
    pub fn extract(&self, text: &str) -> Option<(f64, AmountStrategy)> {
        AmountStrategy::PRECEDENCE
            .into_iter()
            .find_map(|s| self.extract_with(s, text).map(|amount| (amount, s)))
    }

    pub fn amount(&self, text: &str) -> Option<f64> {
        self.extract(text).map(|(amount, _)| amount)
    }
}

fn parse_number(token: &str) -> Option<f64> {
    let cleaned = token.replace(',', "");
    let value: f64 = cleaned.parse().ok()?;
    value.is_finite().then_some(value)
}

/// Explicit currency marker in the text, else `None` (caller applies the default).
pub fn detect_currency(text: &str) -> Option<&'static str> {
    let upper = text.to_uppercase();
    if text.contains('₽') || upper.contains("РУБ") || upper.contains("RUB") {
        Some("RUB")
    } else if text.contains('$') || upper.contains("USD") {
        Some("USD")
    } else if text.contains('€') || upper.contains("EUR") {
        Some("EUR")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex() -> AmountExtractor {
        AmountExtractor::new().unwrap()
    }

    #[test]
    fn test_currency_suffix_variants() {
        let e = ex();
        let s = AmountStrategy::CurrencySuffix;
        assert_eq!(e.extract_with(s, "Купил продукты на 1500 руб"), Some(1500.0));
        assert_eq!(e.extract_with(s, "Сумма 1,500.50 ₽ за неделю"), Some(1500.5));
        assert_eq!(e.extract_with(s, "3 кофе за 450р"), Some(450.0));
        assert_eq!(e.extract_with(s, "итого 99 RUB"), Some(99.0));
        assert_eq!(e.extract_with(s, "итого 99 рублей"), Some(99.0));
        assert_eq!(e.extract_with(s, "5 рыбин"), None);
        assert_eq!(e.extract_with(s, "Такси 350"), None);
    }

    #[test]
    fn test_trailing_number() {
        let e = ex();
        let s = AmountStrategy::TrailingNumber;
        assert_eq!(e.extract_with(s, "Обед 2 человека 1200"), Some(1200.0));
        assert_eq!(e.extract_with(s, "Такси 350.  "), Some(350.0));
        assert_eq!(e.extract_with(s, "7 яблок"), None);
    }

    #[test]
    fn test_first_number() {
        let e = ex();
        let s = AmountStrategy::FirstNumber;
        assert_eq!(e.extract_with(s, "7 яблок и 3 груши купил"), Some(7.0));
        assert_eq!(e.extract_with(s, "без суммы"), None);
    }

    #[test]
    fn test_precedence() {
        let e = ex();
        assert_eq!(
            e.extract("3 кофе за 450р, чек 12"),
            Some((450.0, AmountStrategy::CurrencySuffix))
        );
        assert_eq!(
            e.extract("Обед 2 человека 1200"),
            Some((1200.0, AmountStrategy::TrailingNumber))
        );
        assert_eq!(e.extract("7 яблок"), Some((7.0, AmountStrategy::FirstNumber)));
        assert_eq!(e.extract("ничего"), None);
    }

    #[test]
    fn test_thousands_separators_are_stripped() {
        assert_eq!(ex().amount("Зарплата 120,000"), Some(120000.0));
    }

    #[test]
    fn test_non_ascii_digits_ignored() {
        assert_eq!(ex().amount("٣٤٥"), None);
    }

    #[test]
    fn test_detect_currency() {
        assert_eq!(detect_currency("1500 руб"), Some("RUB"));
        assert_eq!(detect_currency("20 $"), Some("USD"));
        assert_eq!(detect_currency("15 EUR"), Some("EUR"));
        assert_eq!(detect_currency("Такси 350"), None);
    }
}
