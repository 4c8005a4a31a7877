use std::fmt;

pub const ENRICHMENT_MARKER: char = ';';
pub const NEW_ENTRY_SENTINEL: &str = "new";

const PRICE_GLYPH: &str = "💵";
const MAX_PRICE_TIER: u8 = 4;

pub mod placeholder {
    pub const WEBSITE: &str = "No website available";
    pub const CITY: &str = "No city available";
    pub const COUNTRY: &str = "No country available";
    pub const MAP_LINK: &str = "No link available";
    pub const PRICE: &str = "❓";
    pub const CUISINE: &str = "❓";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTier {
    Tier(u8),
    Unknown,
}

impl PriceTier {
    pub fn from_level(level: Option<i64>) -> Self {
        match level {
            Some(value) if (0..=MAX_PRICE_TIER as i64).contains(&value) => {
                PriceTier::Tier(value as u8)
            }
            _ => PriceTier::Unknown,
        }
    }

    pub fn render(&self) -> String {
        match self {
            PriceTier::Tier(count) => PRICE_GLYPH.repeat(*count as usize),
            PriceTier::Unknown => placeholder::PRICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub name: String,
    pub website: Option<String>,
    pub price: PriceTier,
    pub city: Option<String>,
    pub country: Option<String>,
    pub map_link: Option<String>,
    pub address: Option<String>,
    pub photo_reference: Option<String>,
    pub cuisine: Option<String>,
}

impl PlaceRecord {
    pub fn with_cuisine(mut self, cuisine: Option<String>) -> Self {
        self.cuisine = cuisine;
        self
    }

    pub fn website_or_placeholder(&self) -> &str {
        self.website.as_deref().unwrap_or(placeholder::WEBSITE)
    }

    pub fn city_or_placeholder(&self) -> &str {
        self.city.as_deref().unwrap_or(placeholder::CITY)
    }

    pub fn country_or_placeholder(&self) -> &str {
        self.country.as_deref().unwrap_or(placeholder::COUNTRY)
    }

    pub fn map_link_or_placeholder(&self) -> &str {
        self.map_link.as_deref().unwrap_or(placeholder::MAP_LINK)
    }

    pub fn cuisine_or_placeholder(&self) -> &str {
        self.cuisine.as_deref().unwrap_or(placeholder::CUISINE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryTarget {
    Existing(String),
    New,
}

impl EntryTarget {
    pub fn from_raw_id(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() && id != NEW_ENTRY_SENTINEL => {
                EntryTarget::Existing(id.to_string())
            }
            _ => EntryTarget::New,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            EntryTarget::Existing(id) => Some(id),
            EntryTarget::New => None,
        }
    }
}

impl fmt::Display for EntryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryTarget::Existing(id) => f.write_str(id),
            EntryTarget::New => f.write_str(NEW_ENTRY_SENTINEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub target: EntryTarget,
    pub title: String,
}

impl DatabaseEntry {
    pub fn new_row(identifier: impl Into<String>) -> Self {
        Self {
            target: EntryTarget::New,
            title: identifier.into(),
        }
    }

    pub fn existing(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            target: EntryTarget::Existing(id.into()),
            title: title.into(),
        }
    }

    pub fn lookup_identifier(&self) -> &str {
        strip_enrichment_marker(&self.title).unwrap_or(&self.title)
    }
}

pub fn strip_enrichment_marker(title: &str) -> Option<&str> {
    title.strip_suffix(ENRICHMENT_MARKER)
}

pub fn needs_enrichment(title: &str) -> bool {
    strip_enrichment_marker(title).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_numeric_tiers_as_repeated_glyphs() {
        for level in 0..=4_i64 {
            let rendered = PriceTier::from_level(Some(level)).render();
            assert_eq!(rendered.matches(PRICE_GLYPH).count(), level as usize);
            assert_eq!(rendered, PRICE_GLYPH.repeat(level as usize));
        }
    }

    #[test]
    fn out_of_range_or_missing_tier_is_unknown() {
        for level in [Some(-1), Some(5), Some(42), None] {
            let tier = PriceTier::from_level(level);
            assert_eq!(tier, PriceTier::Unknown);
            assert_eq!(tier.render(), placeholder::PRICE);
        }
    }

    #[test]
    fn zero_tier_is_not_the_unknown_placeholder() {
        let tier = PriceTier::from_level(Some(0));
        assert_eq!(tier, PriceTier::Tier(0));
        assert_ne!(tier.render(), placeholder::PRICE);
    }

    #[test]
    fn strips_exactly_one_trailing_marker() {
        assert_eq!(strip_enrichment_marker("Rose's Luxury;"), Some("Rose's Luxury"));
        assert_eq!(strip_enrichment_marker("Odd;;"), Some("Odd;"));
        assert_eq!(strip_enrichment_marker("Rose's Luxury"), None);
        assert!(!needs_enrichment("Semi;colon inside"));
    }

    #[test]
    fn sentinel_id_maps_to_new_target() {
        assert_eq!(EntryTarget::from_raw_id(Some("new")), EntryTarget::New);
        assert_eq!(EntryTarget::from_raw_id(None), EntryTarget::New);
        assert_eq!(EntryTarget::from_raw_id(Some("  ")), EntryTarget::New);
        assert_eq!(
            EntryTarget::from_raw_id(Some("page-1")),
            EntryTarget::Existing("page-1".into())
        );
    }

    #[test]
    fn placeholders_apply_only_to_missing_values() {
        let record = PlaceRecord {
            name: "Somewhere".into(),
            website: None,
            price: PriceTier::Unknown,
            city: Some("Paris".into()),
            country: None,
            map_link: None,
            address: None,
            photo_reference: None,
            cuisine: None,
        };
        assert_eq!(record.website_or_placeholder(), placeholder::WEBSITE);
        assert_eq!(record.city_or_placeholder(), "Paris");
        assert_eq!(record.country_or_placeholder(), placeholder::COUNTRY);
        assert_eq!(record.cuisine_or_placeholder(), placeholder::CUISINE);
    }
}
