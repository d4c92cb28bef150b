use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codes::*;

/// Protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "3.4";

// ============ Request ============

/// Outer request document: protocol version, partner id and the application.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub version: String,
    pub partner_id: String,
    pub application: ApplicationDocument,
}

impl RequestEnvelope {
    /// Wraps an application for the current protocol revision.
    pub fn new(partner_id: impl Into<String>, application: ApplicationDocument) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            partner_id: partner_id.into(),
            application,
        }
    }
}

/// One credit-report request.
///
/// `subject` and `reason` are mandatory; every other section is optional and
/// is left out of the serialized form entirely when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDocument {
    /// Request id, unique per partner.
    pub request_number: u64,
    /// Date the report is requested for.
    pub report_date: NaiveDate,
    /// Report identifier agreed with the bureau.
    pub report_type: String,
    pub subject: Subject,
    pub reason: RequestReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_address: Option<Address>,
}

impl ApplicationDocument {
    /// Minimal valid document: identity plus purpose.
    pub fn new(
        request_number: u64,
        report_date: NaiveDate,
        report_type: impl Into<String>,
        subject: Subject,
        reason: RequestReason,
    ) -> Self {
        Self {
            request_number,
            report_date,
            report_type: report_type.into(),
            subject,
            reason,
            reason_text: None,
            application: None,
            registered_address: None,
            actual_address: None,
        }
    }
}

/// Credit-report subject: exactly one of a person or a legal entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    Person(Person),
    LegalEntity(LegalEntity),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub last_name: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    pub birthday: NaiveDate,
    pub birthplace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<IdentityDocument>,
    /// Taxpayer number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    /// Pension insurance number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snils: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityDocument {
    pub doc_type: DocumentType,
    /// Series and number.
    pub number: String,
    pub issued_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<NaiveDate>,
    /// Issuing authority, place of issue and authority code, `;` separated.
    pub issued_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalEntity {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_name: Option<String>,
    pub residency: Residency,
    pub registration_country: Country,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    /// State registration number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ogrn: Option<String>,
}

/// The credit application the report is requested for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDetails {
    pub consent: Flag,
    pub consent_date: NaiveDate,
    pub consent_end_date: NaiveDate,
    /// Whether the user was informed about administrative liability.
    pub admin_liability_notice: Flag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_frequency: Option<IncomeFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<FinancingPurpose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit: Option<CreditTerms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant: Option<ApplicantProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTerms {
    pub credit_type: CreditType,
    pub currency: Currency,
    /// Amount or limit.
    pub amount: BigDecimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit: Option<BigDecimal>,
    /// Final balloon payment (leasing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic_payment: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<CreditSecurity>,
}

/// Applicant details attached to the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplicantProfile {
    Individual(IndividualProfile),
    Company(CompanyProfile),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndividualProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizenship: Option<Country>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<MaritalStatus>,
    /// Dependants aged 18 or younger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependants_under_18: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependants_over_18: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<Education>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_work: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment: Option<Employment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employment {
    pub current: EmploymentCurrent,
    pub duration_months: u32,
    pub employment_type: EmploymentType,
    pub profession: Profession,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer: Option<Employer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employer {
    pub name: String,
    pub state: CompanyState,
    pub size: CompanySize,
    pub area: CompanyArea,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub state: CompanyState,
    pub size: CompanySize,
    pub area: CompanyArea,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_text: Option<String>,
    pub registered_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub owner: AddressOwner,
    pub postal_index: String,
    /// Whole address on one line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_line: Option<String>,
    pub country: Country,
    pub region: RegionCode,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub street: String,
    pub house: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat: Option<String>,
}

// ============ Response ============

/// Outer reply document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub version: String,
    pub partner_id: String,
    /// Gateway timestamp, verbatim.
    pub timestamp: String,
    pub response: ReportResponse,
}

/// Outcome reported by the bureau for a request.
///
/// Unknown codes are kept rather than rejected: the reply code set belongs to
/// the bureau and a new code must not make an otherwise valid reply unreadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Accepted,
    Rejected,
    Error,
    Other(String),
}

impl ResponseCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => ResponseCode::Accepted,
            "1" => ResponseCode::Rejected,
            "2" => ResponseCode::Error,
            other => ResponseCode::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ResponseCode::Accepted => "0",
            ResponseCode::Rejected => "1",
            ResponseCode::Error => "2",
            ResponseCode::Other(code) => code,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ResponseCode::Accepted)
    }
}

/// Reply sections whose structure this protocol layer does not interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Title,
    Base,
    Supplementary,
    InformationParts,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Title,
        SectionKind::Base,
        SectionKind::Supplementary,
        SectionKind::InformationParts,
    ];

    pub fn element_name(&self) -> &'static str {
        match self {
            SectionKind::Title => "title_part",
            SectionKind::Base => "base_part",
            SectionKind::Supplementary => "add_part",
            SectionKind::InformationParts => "information_parts",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        SectionKind::ALL
            .into_iter()
            .find(|kind| kind.element_name() == name)
    }
}

/// Verbatim inner markup of one opaque reply section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueSection {
    pub kind: SectionKind,
    /// Inner markup bytes exactly as received (UTF-8, after charset decoding).
    pub raw: Vec<u8>,
}

impl OpaqueSection {
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.raw).ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportResponse {
    /// Echo of the request number.
    pub number: Option<String>,
    pub code: ResponseCode,
    pub text: String,
    /// Opaque sections in document order.
    pub sections: Vec<OpaqueSection>,
}

impl ReportResponse {
    pub fn section(&self, kind: SectionKind) -> Option<&OpaqueSection> {
        self.sections.iter().find(|section| section.kind == kind)
    }
}
