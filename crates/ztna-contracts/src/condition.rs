//! Leaf predicate types and the closed condition vocabulary.
//!
//! The vocabulary is a set of exhaustive matches: every `ConditionType`
//! knows its operators, and every `ConditionOp` knows its owning type and
//! the field it reads. The editor, the validator and the evaluator all read
//! these tables, so they cannot drift apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// The family of fact a condition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    /// Identity facts: group membership, email.
    User,
    /// Network facts: source address, country.
    Network,
    /// Device posture facts: operating system, management state.
    Device,
}

impl ConditionType {
    /// Every condition type, in editor order.
    pub const ALL: [ConditionType; 3] = [Self::User, Self::Network, Self::Device];

    /// The operators allowed for this type. The first entry is the default
    /// operator a freshly switched condition receives.
    pub fn ops(self) -> &'static [ConditionOp] {
        match self {
            Self::User => &[ConditionOp::InGroup, ConditionOp::Is, ConditionOp::EmailSuffix],
            Self::Network => &[ConditionOp::Cidr, ConditionOp::Country, ConditionOp::IsPrivate],
            Self::Device => &[ConditionOp::Os, ConditionOp::Managed],
        }
    }

    /// The operator a condition of this type starts with.
    pub fn default_op(self) -> ConditionOp {
        match self {
            Self::User => ConditionOp::InGroup,
            Self::Network => ConditionOp::Cidr,
            Self::Device => ConditionOp::Os,
        }
    }

    /// Return true if `op` belongs to this type's vocabulary.
    pub fn allows(self, op: ConditionOp) -> bool {
        op.condition_type() == self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Network => "Network",
            Self::Device => "Device",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate operator. Each operator belongs to exactly one `ConditionType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    /// User is a member of the named group.
    InGroup,
    /// User's email equals the value.
    Is,
    /// User's email domain ends with the value.
    EmailSuffix,
    /// Source address lies inside the IPv4 CIDR value.
    Cidr,
    /// Source country equals the ISO 3166-1 alpha-2 value.
    Country,
    /// Source address is an RFC 1918 private address. Takes no value.
    IsPrivate,
    /// Device operating system equals the value.
    Os,
    /// Device is managed by the organisation. Takes no value.
    Managed,
}

impl ConditionOp {
    /// The type whose vocabulary contains this operator.
    pub fn condition_type(self) -> ConditionType {
        match self {
            Self::InGroup | Self::Is | Self::EmailSuffix => ConditionType::User,
            Self::Cidr | Self::Country | Self::IsPrivate => ConditionType::Network,
            Self::Os | Self::Managed => ConditionType::Device,
        }
    }

    /// The canonical field this operator reads.
    pub fn field(self) -> ConditionField {
        match self {
            Self::InGroup => ConditionField::Group,
            Self::Is | Self::EmailSuffix => ConditionField::Email,
            Self::Cidr | Self::IsPrivate => ConditionField::Ip,
            Self::Country => ConditionField::Country,
            Self::Os => ConditionField::Os,
            Self::Managed => ConditionField::Managed,
        }
    }

    /// Return false for operators whose `value` is ignored.
    pub fn takes_value(self) -> bool {
        !matches!(self, Self::IsPrivate | Self::Managed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InGroup => "in_group",
            Self::Is => "is",
            Self::EmailSuffix => "email_suffix",
            Self::Cidr => "cidr",
            Self::Country => "country",
            Self::IsPrivate => "is_private",
            Self::Os => "os",
            Self::Managed => "managed",
        }
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request attribute a condition reads. Derived from the operator and
/// carried on the wire for readers that only look at `field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Group,
    Email,
    Ip,
    Country,
    Os,
    Managed,
}

impl ConditionField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Email => "email",
            Self::Ip => "ip",
            Self::Country => "country",
            Self::Os => "os",
            Self::Managed => "managed",
        }
    }
}

impl fmt::Display for ConditionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating systems a `Device/os` condition may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Windows,
    Linux,
    Darwin,
}

impl Os {
    pub const ALL: [Os; 3] = [Self::Windows, Self::Linux, Self::Darwin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Darwin => "darwin",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Os::ALL
            .into_iter()
            .find(|os| os.as_str() == s)
            .ok_or_else(|| format!("unknown operating system '{s}' (expected windows, linux or darwin)"))
    }
}

/// A single typed predicate: the leaf of a policy tree.
///
/// `field` is redundant with `op` and only kept for the wire format. Build
/// conditions through [`Condition::new`] so the two never disagree. A
/// decoded condition without `field` takes the one `op` reads; a present
/// but mismatched `field` survives decoding and is rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub field: ConditionField,
    pub op: ConditionOp,
    #[serde(default)]
    pub value: String,
}

#[derive(Deserialize)]
struct WireCondition {
    #[serde(rename = "type")]
    kind: ConditionType,
    #[serde(default)]
    field: Option<ConditionField>,
    op: ConditionOp,
    #[serde(default)]
    value: String,
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireCondition::deserialize(deserializer)?;
        Ok(Self {
            kind: wire.kind,
            field: wire.field.unwrap_or_else(|| wire.op.field()),
            op: wire.op,
            value: wire.value,
        })
    }
}

impl Condition {
    /// Build a condition whose type and field are derived from `op`.
    pub fn new(op: ConditionOp, value: impl Into<String>) -> Self {
        Self {
            kind: op.condition_type(),
            field: op.field(),
            op,
            value: value.into(),
        }
    }

    /// The blank condition an editor inserts for `kind`: default operator,
    /// empty value.
    pub fn default_for(kind: ConditionType) -> Self {
        Self::new(kind.default_op(), String::new())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.takes_value() {
            write!(f, "{}: {} {}", self.kind, self.op, self.value)
        } else {
            write!(f, "{}: {}", self.kind, self.op)
        }
    }
}

/// ISO 3166-1 alpha-2 codes accepted by `Network/country` conditions.
pub const COUNTRY_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

/// Return true if `code` is a known upper-case alpha-2 country code.
pub fn is_known_country(code: &str) -> bool {
    COUNTRY_CODES.binary_search(&code).is_ok()
}
