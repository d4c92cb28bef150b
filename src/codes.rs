//! Closed wire enumerations used by the application record.
//!
//! Every enumerated field of the record is a closed set of codes. The only way
//! to obtain one from text is `FromStr` (or serde), which rejects anything
//! outside the set, so an invalid code can never reach the serializer.

use std::fmt;

/// A code that is not a member of its closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCode {
    /// Name of the enumeration (e.g. `Gender`).
    pub kind: &'static str,
    /// The rejected value, verbatim.
    pub value: String,
}

impl InvalidCode {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for InvalidCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid {} code", self.value, self.kind)
    }
}

impl std::error::Error for InvalidCode {}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every member of the set, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Code written on the wire.
            pub fn code(&self) -> &'static str {
                match self {
                    $( $name::$variant => $code ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $code => Ok($name::$variant), )+
                    other => Err(InvalidCode::new(stringify!($name), other)),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.code())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

wire_enum! {
    /// Country of citizenship, registration or address (ISO 3166 alpha-2).
    Country {
        Russia => "RU",
        Belarus => "BY",
        Kazakhstan => "KZ",
        Ukraine => "UA",
        Armenia => "AM",
        Azerbaijan => "AZ",
        Georgia => "GE",
        Kyrgyzstan => "KG",
        Moldova => "MD",
        Tajikistan => "TJ",
        Turkmenistan => "TM",
        Uzbekistan => "UZ",
        Germany => "DE",
        China => "CN",
        UnitedStates => "US",
    }
}

wire_enum! {
    Gender {
        Male => "1",
        Female => "2",
    }
}

wire_enum! {
    /// Type of the identity document presented by a person.
    DocumentType {
        Passport => "1",
        ForeignPassport => "2",
        MilitaryId => "3",
        ResidencePermit => "4",
        ForeignCitizenPassport => "5",
        Other => "99",
    }
}

wire_enum! {
    /// Purpose for which the credit report is requested.
    RequestReason {
        CreditApplication => "1",
        CreditReview => "2",
        Guarantor => "3",
        Employment => "4",
        Insurance => "5",
        Other => "99",
    }
}

wire_enum! {
    /// Generic yes/no flag (consent, administrative notice).
    Flag {
        No => "0",
        Yes => "1",
    }
}

wire_enum! {
    IncomeFrequency {
        Monthly => "1",
        Quarterly => "2",
        Yearly => "3",
    }
}

wire_enum! {
    /// What the requested financing is for.
    FinancingPurpose {
        Consumer => "1",
        Car => "2",
        Mortgage => "3",
        Business => "4",
        Education => "5",
        Other => "99",
    }
}

wire_enum! {
    CreditType {
        Loan => "1",
        CreditCard => "2",
        Overdraft => "3",
        Leasing => "4",
        Microloan => "5",
        Mortgage => "6",
    }
}

wire_enum! {
    Currency {
        Rub => "RUB",
        Usd => "USD",
        Eur => "EUR",
    }
}

wire_enum! {
    CreditSecurity {
        Unsecured => "0",
        Guarantee => "1",
        Pledge => "2",
        RealEstate => "3",
        Vehicle => "4",
    }
}

wire_enum! {
    MaritalStatus {
        Single => "0",
        Married => "1",
        Divorced => "2",
        Widowed => "3",
        CivilUnion => "4",
    }
}

wire_enum! {
    Education {
        Secondary => "1",
        Vocational => "2",
        IncompleteHigher => "3",
        Higher => "4",
        Postgraduate => "5",
    }
}

wire_enum! {
    /// Whether an employment record is the current or a previous job.
    EmploymentCurrent {
        Previous => "0",
        Current => "1",
    }
}

wire_enum! {
    EmploymentType {
        FullTime => "1",
        PartTime => "2",
        SelfEmployed => "3",
        Contract => "4",
        Unemployed => "5",
        Retired => "6",
    }
}

wire_enum! {
    Profession {
        Worker => "1",
        Specialist => "2",
        Manager => "3",
        Executive => "4",
        Entrepreneur => "5",
        Military => "6",
        Other => "99",
    }
}

wire_enum! {
    /// State participation in a company.
    CompanyState {
        State => "1",
        Private => "2",
        Mixed => "3",
    }
}

wire_enum! {
    CompanySize {
        Micro => "1",
        Small => "2",
        Medium => "3",
        Large => "4",
    }
}

wire_enum! {
    /// Field of activity of a company.
    CompanyArea {
        Agriculture => "1",
        Manufacturing => "2",
        Construction => "3",
        Trade => "4",
        Transport => "5",
        Finance => "6",
        InformationTechnology => "7",
        Healthcare => "8",
        Education => "9",
        PublicSector => "10",
        Other => "99",
    }
}

wire_enum! {
    /// Registration status of the subject at an address.
    AddressOwner {
        Permanent => "1",
        Temporary => "2",
        Unregistered => "3",
    }
}

wire_enum! {
    Residency {
        NonResident => "0",
        Resident => "1",
    }
}

/// Two-digit administrative region code, `01` through `99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionCode(u8);

impl RegionCode {
    pub fn new(code: u8) -> Result<Self, InvalidCode> {
        if (1..=99).contains(&code) {
            Ok(Self(code))
        } else {
            Err(InvalidCode::new("RegionCode", code.to_string()))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl std::str::FromStr for RegionCode {
    type Err = InvalidCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidCode::new("RegionCode", s));
        }
        let code: u8 = s
            .parse()
            .map_err(|_| InvalidCode::new("RegionCode", s))?;
        RegionCode::new(code).map_err(|_| InvalidCode::new("RegionCode", s))
    }
}

impl serde::Serialize for RegionCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for RegionCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_from_str() {
        for gender in Gender::ALL {
            assert_eq!(gender.code().parse::<Gender>().unwrap(), *gender);
        }
        for area in CompanyArea::ALL {
            assert_eq!(area.code().parse::<CompanyArea>().unwrap(), *area);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        let err = "7".parse::<Gender>().unwrap_err();
        assert_eq!(err.kind, "Gender");
        assert_eq!(err.value, "7");

        assert!("ru".parse::<Country>().is_err());
        assert!("".parse::<Currency>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_code() {
        let json = serde_json::to_string(&Country::Russia).unwrap();
        assert_eq!(json, "\"RU\"");

        let parsed: MaritalStatus = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(parsed, MaritalStatus::Married);

        let bad: Result<MaritalStatus, _> = serde_json::from_str("\"9\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_region_code_bounds() {
        assert_eq!("77".parse::<RegionCode>().unwrap().value(), 77);
        assert_eq!(RegionCode::new(5).unwrap().to_string(), "05");
        assert!("00".parse::<RegionCode>().is_err());
        assert!("7".parse::<RegionCode>().is_err());
        assert!("123".parse::<RegionCode>().is_err());
        assert!("+7".parse::<RegionCode>().is_err());
        assert!(RegionCode::new(100).is_err());
    }
}
