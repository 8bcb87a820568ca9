use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::ids::EmojiId;

/// A reaction symbol in its normalized token form.
///
/// Unicode emoji pass through (trimmed). Custom emoji are accepted as
/// `<:name:id>`, `<a:name:id>`, `:name:id` or `name:id` and always normalize to
/// `<:name:id>`, which is also what inbound reaction events produce, so persisted
/// bindings and live events compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionSymbol(String);

impl ReactionSymbol {
    /// Returns `None` when the input is blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        match parse_custom_emoji(trimmed) {
            Some((name, id)) => Some(Self::custom(name, id)),
            None => Some(Self(trimmed.to_owned())),
        }
    }

    /// Builds the symbol carried by a gateway reaction payload.
    pub fn from_emoji(name: &str, id: Option<EmojiId>) -> Option<Self> {
        match id {
            Some(id) if !name.trim().is_empty() => Some(Self::custom(name.trim(), id.get())),
            Some(_) => None,
            None => Self::parse(name),
        }
    }

    fn custom(name: &str, id: u64) -> Self {
        Self(format!("<:{name}:{id}>"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_custom(&self) -> bool {
        self.custom_parts().is_some()
    }

    /// `:fire:` style names. Reactions never arrive in this form, so a
    /// binding keyed by one could never match.
    pub fn is_shortcode(&self) -> bool {
        self.0
            .strip_prefix(':')
            .and_then(|rest| rest.strip_suffix(':'))
            .is_some_and(|name| {
                !name.is_empty() && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            })
    }

    /// `(name, id)` for custom emoji.
    pub fn custom_parts(&self) -> Option<(&str, u64)> {
        parse_custom_emoji(&self.0)
    }

    /// The form the REST reaction endpoints expect: `name:id` for custom emoji,
    /// the raw grapheme otherwise (the caller percent-encodes it).
    pub fn api_form(&self) -> String {
        match self.custom_parts() {
            Some((name, id)) => format!("{name}:{id}"),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for ReactionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_custom_emoji(token: &str) -> Option<(&str, u64)> {
    let inner = match token.strip_prefix('<') {
        Some(rest) => rest.strip_suffix('>')?,
        None => token,
    };

    let parts: Vec<&str> = inner.split(':').collect();
    let (name, id) = match parts.as_slice() {
        ["", name, id] | ["a", name, id] => (*name, *id),
        [name, id] => (*name, *id),
        _ => return None,
    };

    let valid_name =
        !name.is_empty() && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid_name {
        return None;
    }

    let id = id.parse::<u64>().ok()?;
    Some((name, id))
}

#[cfg(test)]
mod tests {
    use super::ReactionSymbol;
    use crate::domain::ids::EmojiId;

    #[test]
    fn unicode_symbols_pass_through_trimmed() {
        let symbol = ReactionSymbol::parse("  🔥 ").expect("symbol");
        assert_eq!(symbol.as_str(), "🔥");
        assert!(!symbol.is_custom());
    }

    #[test]
    fn custom_emoji_spellings_normalize_to_one_form() {
        let spellings = ["<:party:123>", "<a:party:123>", ":party:123", "party:123"];
        for spelling in spellings {
            let symbol = ReactionSymbol::parse(spelling).expect("symbol");
            assert_eq!(symbol.as_str(), "<:party:123>", "spelling `{spelling}`");
        }
    }

    #[test]
    fn gateway_emoji_matches_persisted_form() {
        let inbound = ReactionSymbol::from_emoji("party", Some(EmojiId(123))).expect("symbol");
        let persisted = ReactionSymbol::parse("<a:party:123>").expect("symbol");
        assert_eq!(inbound, persisted);

        let unicode = ReactionSymbol::from_emoji("🔴", None).expect("symbol");
        assert_eq!(unicode, ReactionSymbol::parse("🔴").expect("symbol"));
    }

    #[test]
    fn blank_and_malformed_input() {
        assert_eq!(ReactionSymbol::parse("   "), None);
        assert_eq!(ReactionSymbol::from_emoji("", Some(EmojiId(5))), None);
        // Not a valid custom emoji, kept verbatim as an opaque token.
        let odd = ReactionSymbol::parse("<:bad name:12>").expect("symbol");
        assert_eq!(odd.as_str(), "<:bad name:12>");
    }

    #[test]
    fn shortcodes_are_recognized_but_custom_emoji_are_not() {
        assert!(ReactionSymbol::parse(":fire:").expect("symbol").is_shortcode());
        assert!(ReactionSymbol::parse(" :thumbs_up: ").expect("symbol").is_shortcode());
        assert!(!ReactionSymbol::parse(":party:123").expect("symbol").is_shortcode());
        assert!(!ReactionSymbol::parse("🔥").expect("symbol").is_shortcode());
        assert!(!ReactionSymbol::parse("::").expect("symbol").is_shortcode());
    }

    #[test]
    fn api_form_strips_brackets_for_custom_emoji() {
        assert_eq!(ReactionSymbol::parse("<:party:123>").expect("symbol").api_form(), "party:123");
        assert_eq!(ReactionSymbol::parse("🔵").expect("symbol").api_form(), "🔵");
    }
}
