//! Hierarchy levels
//!
//! The crawl walks five levels top-down. Every level except the last owns a
//! list page whose items become nodes one level deeper.

use std::fmt;
use std::str::FromStr;

/// One rank in the region > sub-region > postal-area > street > listing hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Region,
    SubRegion,
    PostalArea,
    Street,
    Listing,
}

impl Level {
    /// All levels, shallowest first
    pub fn all() -> [Self; 5] {
        [
            Self::Region,
            Self::SubRegion,
            Self::PostalArea,
            Self::Street,
            Self::Listing,
        ]
    }

    /// Levels whose nodes have a list page of children
    pub fn parent_levels() -> [Self; 4] {
        [Self::Region, Self::SubRegion, Self::PostalArea, Self::Street]
    }

    /// The level one rank above, if any
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Region => None,
            Self::SubRegion => Some(Self::Region),
            Self::PostalArea => Some(Self::SubRegion),
            Self::Street => Some(Self::PostalArea),
            Self::Listing => Some(Self::Street),
        }
    }

    /// The level one rank below, if any
    pub fn child(&self) -> Option<Self> {
        match self {
            Self::Region => Some(Self::SubRegion),
            Self::SubRegion => Some(Self::PostalArea),
            Self::PostalArea => Some(Self::Street),
            Self::Street => Some(Self::Listing),
            Self::Listing => None,
        }
    }

    /// Name of the table holding this level
    ///
    /// Listings are sharded per region; this is the prefix of those tables.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Region => "regions",
            Self::SubRegion => "sub_regions",
            Self::PostalArea => "postal_areas",
            Self::Street => "streets",
            Self::Listing => "listings",
        }
    }

    /// Name of the foreign-key column that descendants use to reference this level
    pub fn ref_column(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::SubRegion => "sub_region",
            Self::PostalArea => "postal_area",
            Self::Street => "street",
            Self::Listing => "listing",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::SubRegion => "sub-region",
            Self::PostalArea => "postal-area",
            Self::Street => "street",
            Self::Listing => "listing",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "region" => Ok(Self::Region),
            "sub-region" | "subregion" => Ok(Self::SubRegion),
            "postal-area" | "postalarea" => Ok(Self::PostalArea),
            "street" => Ok(Self::Street),
            "listing" => Ok(Self::Listing),
            other => Err(format!("unknown level '{}'", other)),
        }
    }
}
