//! Closed vocabulary of relationship types.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());
static UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    WorksAt,
    LocatedIn,
    PartOf,
    RelatedTo,
    Manages,
    ReportsTo,
    Owns,
    Founded,
    Acquired,
    InvestedIn,
    CollaboratedWith,
    EmployedBy,
    BasedIn,
    MemberOf,
    SubsidiaryOf,
    PartnerOf,
    CompetesWith,
    SuppliesTo,
    InteractsWith,
}

impl RelationType {
    pub const ALL: [RelationType; 19] = [
        RelationType::WorksAt,
        RelationType::LocatedIn,
        RelationType::PartOf,
        RelationType::RelatedTo,
        RelationType::Manages,
        RelationType::ReportsTo,
        RelationType::Owns,
        RelationType::Founded,
        RelationType::Acquired,
        RelationType::InvestedIn,
        RelationType::CollaboratedWith,
        RelationType::EmployedBy,
        RelationType::BasedIn,
        RelationType::MemberOf,
        RelationType::SubsidiaryOf,
        RelationType::PartnerOf,
        RelationType::CompetesWith,
        RelationType::SuppliesTo,
        RelationType::InteractsWith,
    ];

    /// Target for anything outside the vocabulary
    pub const FALLBACK: RelationType = RelationType::RelatedTo;

    /// Graph-store label. Only these strings are ever interpolated into a query.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::WorksAt => "WORKS_AT",
            RelationType::LocatedIn => "LOCATED_IN",
            RelationType::PartOf => "PART_OF",
            RelationType::RelatedTo => "RELATED_TO",
            RelationType::Manages => "MANAGES",
            RelationType::ReportsTo => "REPORTS_TO",
            RelationType::Owns => "OWNS",
            RelationType::Founded => "FOUNDED",
            RelationType::Acquired => "ACQUIRED",
            RelationType::InvestedIn => "INVESTED_IN",
            RelationType::CollaboratedWith => "COLLABORATED_WITH",
            RelationType::EmployedBy => "EMPLOYED_BY",
            RelationType::BasedIn => "BASED_IN",
            RelationType::MemberOf => "MEMBER_OF",
            RelationType::SubsidiaryOf => "SUBSIDIARY_OF",
            RelationType::PartnerOf => "PARTNER_OF",
            RelationType::CompetesWith => "COMPETES_WITH",
            RelationType::SuppliesTo => "SUPPLIES_TO",
            RelationType::InteractsWith => "INTERACTS_WITH",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == label)
    }

    fn from_synonym(label: &str) -> Option<Self> {
        let mapped = match label {
            "CEO_OF" | "IS_CEO" | "CEO" => RelationType::Manages,
            "WORKS_FOR" | "EMPLOYED_AT" | "EMPLOYEE_OF" => RelationType::WorksAt,
            "LOCATED_AT" | "IN_LOCATION" | "HAS_LOCATION" => RelationType::LocatedIn,
            "IS_PART_OF" | "BELONGS_TO" | "COMPONENT_OF" => RelationType::PartOf,
            "RELATED" | "ASSOCIATED_WITH" | "CONNECTED_TO" => RelationType::RelatedTo,
            _ => return None,
        };
        Some(mapped)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a free-form label onto the vocabulary. Never fails.
pub fn canonicalize_relation_type(raw: &str) -> RelationType {
    let upper = raw.trim().to_uppercase();
    let underscored = NON_WORD.replace_all(&upper, "_");
    let collapsed = UNDERSCORES.replace_all(&underscored, "_");
    let label = collapsed.trim_matches('_');

    RelationType::from_label(label)
        .or_else(|| RelationType::from_synonym(label))
        .unwrap_or(RelationType::FALLBACK)
}
