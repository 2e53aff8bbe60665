//! Canonical enumerations for the registration form's choice fields.
//!
//! Each enumeration is defined exactly once. The database layer derives the
//! server-side enumerated type (or `CHECK` constraint) from [`Choice::TYPE_NAME`]
//! and [`Choice::ALL`], and the request layer parses submitted values through
//! the same literal set, so the two can never drift apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A closed set of literal values stored in a named enumerated column type.
pub trait Choice: Sized + Copy + fmt::Debug + 'static {
    /// Name of the server-side enumerated type.
    const TYPE_NAME: &'static str;

    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// The literal stored in the database and exchanged over the API.
    fn label(self) -> &'static str;

    fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.label()).collect()
    }

    /// Parse a submitted literal. Surrounding whitespace is ignored.
    fn parse_label(value: &str) -> Result<Self, UnknownChoice> {
        let value = value.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.label() == value)
            .ok_or_else(|| UnknownChoice {
                type_name: Self::TYPE_NAME,
                value: value.to_string(),
                allowed: Self::labels(),
            })
    }
}

/// A submitted value that is not part of a choice's literal set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChoice {
    pub type_name: &'static str,
    pub value: String,
    pub allowed: Vec<&'static str>,
}

impl fmt::Display for UnknownChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not a valid {}; expected one of: {}",
            self.value,
            self.type_name,
            self.allowed.join(", ")
        )
    }
}

impl std::error::Error for UnknownChoice {}

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $type_name:literal {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl Choice for $name {
            const TYPE_NAME: &'static str = $type_name;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = UnknownChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_label(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse_label(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

choice_enum! {
    /// Whether the registrant is a student, an employee, or an employee's child.
    UserType as "usertype" {
        Student => "طالب",
        Employee => "موظف",
        EmployeeSon => "ابن موظف",
        NotApplicable => "غير مطبق",
    }
}

choice_enum! {
    AcademicLevel as "academiclevel" {
        Freshman => "السنة الأولى",
        Sophomore => "السنة الثانية",
        Junior => "السنة الثالثة",
        Senior => "السنة الرابعة",
        Graduate => "دراسات عليا",
        NotApplicable => "غير مطبق",
    }
}

choice_enum! {
    /// How the registrant heard about the event.
    HowHeard as "howheard" {
        SocialMedia => "وسائل تواصل اجتماعي",
        AtaaCommunity => "مجتمع عطاء",
        Email => "ايميل",
        Other => "أخرى",
    }
}

choice_enum! {
    /// Islamic and Arabic Studies course the registrant is enrolled in.
    IasCourse as "iascourse" {
        Ias111 => "IAS 111",
        Ias121 => "IAS 121",
        Ias131 => "IAS 131",
        Ias212 => "IAS 212",
        Ias321 => "IAS 321",
        Ias322 => "IAS 322",
        Ias330 => "IAS 330",
        Ias430 => "IAS 430",
    }
}
