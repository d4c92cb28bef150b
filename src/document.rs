//! Canonical markup form of the request and response envelopes.
//!
//! Serialization produces Unicode text whose declaration names the codepage the
//! text will be transcoded to; the charset module does the transcoding.
//! Optional fields that are absent are left out entirely.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::codes::InvalidCode;
use crate::errors::ExchangeError;
use crate::markup::{self, Element, MarkupWriter};
use crate::models::*;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

// ============ Writing ============

/// Serializes a request envelope, declaring `encoding` in the header.
pub fn request_to_markup(envelope: &RequestEnvelope, encoding: &str) -> Result<String, ExchangeError> {
    let mut w = MarkupWriter::with_declaration(encoding)?;
    w.start(
        "bki_request",
        &[
            ("version", envelope.version.as_str()),
            ("partnerid", envelope.partner_id.as_str()),
        ],
    )?;
    write_application(&mut w, &envelope.application)?;
    w.end("bki_request")?;
    w.finish()
}

fn write_application(w: &mut MarkupWriter, doc: &ApplicationDocument) -> Result<(), ExchangeError> {
    let num = doc.request_number.to_string();
    let report_date = date(&doc.report_date);
    w.start(
        "request",
        &[("num", num.as_str()), ("dateofreport", report_date.as_str())],
    )?;

    match &doc.subject {
        Subject::Person(person) => write_person(w, person)?,
        Subject::LegalEntity(entity) => write_legal_entity(w, entity)?,
    }
    w.leaf("reason", doc.reason)?;
    w.opt_leaf("reason_text", doc.reason_text.as_deref())?;
    if let Some(details) = &doc.application {
        write_details(w, details)?;
    }
    if let Some(address) = &doc.registered_address {
        write_address(w, "addr_reg", "addr_reg_total", address)?;
    }
    if let Some(address) = &doc.actual_address {
        write_address(w, "addr_fact", "addr_fact_total", address)?;
    }
    w.leaf("type", &doc.report_type)?;
    w.end("request")
}

fn write_person(w: &mut MarkupWriter, person: &Person) -> Result<(), ExchangeError> {
    w.start("private", &[])?;
    w.leaf("lastname", &person.last_name)?;
    w.leaf("firstname", &person.first_name)?;
    w.opt_leaf("middlename", person.middle_name.as_deref())?;
    w.opt_leaf("gender", person.gender)?;
    w.leaf("birthday", date(&person.birthday))?;
    w.leaf("birthplace", &person.birthplace)?;
    if let Some(doc) = &person.document {
        w.start("doc", &[])?;
        w.leaf("doctype", doc.doc_type)?;
        w.leaf("docno", &doc.number)?;
        w.leaf("docdate", date(&doc.issued_on))?;
        w.opt_leaf("docenddate", doc.expires_on.as_ref().map(date))?;
        w.leaf("docplace", &doc.issued_by)?;
        w.end("doc")?;
    }
    w.opt_leaf("inn", person.inn.as_deref())?;
    w.opt_leaf("pfno", person.snils.as_deref())?;
    w.end("private")
}

fn write_legal_entity(w: &mut MarkupWriter, entity: &LegalEntity) -> Result<(), ExchangeError> {
    w.start("commercial", &[])?;
    w.leaf("fullname", &entity.full_name)?;
    w.opt_leaf("shortname", entity.short_name.as_deref())?;
    w.opt_leaf("firmname", entity.firm_name.as_deref())?;
    w.opt_leaf("foreignname", entity.foreign_name.as_deref())?;
    w.leaf("resident", entity.residency)?;
    w.leaf("regcountry", entity.registration_country)?;
    w.opt_leaf("phone", entity.phone.as_deref())?;
    w.opt_leaf("inn", entity.inn.as_deref())?;
    w.opt_leaf("egrn", entity.ogrn.as_deref())?;
    w.end("commercial")
}

fn write_details(w: &mut MarkupWriter, details: &ApplicationDetails) -> Result<(), ExchangeError> {
    w.start("application", &[])?;
    w.leaf("consent", details.consent)?;
    w.leaf("consentdate", date(&details.consent_date))?;
    w.leaf("consentenddate", date(&details.consent_end_date))?;
    w.leaf("admcode_inform", details.admin_liability_notice)?;
    w.opt_leaf("consent_owner", details.consent_owner.as_deref())?;
    w.opt_leaf("income", details.income.as_ref())?;
    w.opt_leaf("income_frequency", details.income_frequency)?;
    w.opt_leaf("purpose", details.purpose)?;
    w.opt_leaf("purpose_text", details.purpose_text.as_deref())?;
    w.opt_leaf("application_num", details.number.as_deref())?;
    w.leaf("application_date", date(&details.date))?;
    if let Some(credit) = &details.credit {
        w.leaf("cred_type", credit.credit_type)?;
        w.leaf("cred_currency", credit.currency)?;
        w.leaf("cred_sum", &credit.amount)?;
        w.opt_leaf("cred_deposit", credit.deposit.as_ref())?;
        w.opt_leaf("cred_last_payment", credit.last_payment.as_ref())?;
        w.opt_leaf("cred_sum_payment", credit.periodic_payment.as_ref())?;
        w.opt_leaf("cred_duration", credit.duration_months)?;
        w.opt_leaf("cred_security", credit.security)?;
    }
    w.opt_leaf("comment", details.comment.as_deref())?;
    match &details.applicant {
        Some(ApplicantProfile::Individual(profile)) => write_individual_profile(w, profile)?,
        Some(ApplicantProfile::Company(profile)) => {
            w.start("commercial", &[])?;
            w.leaf("company_state", profile.state)?;
            w.leaf("company_size", profile.size)?;
            w.leaf("company_area", profile.area)?;
            w.opt_leaf("company_area_text", profile.area_text.as_deref())?;
            w.leaf("company_beginning_date", date(&profile.registered_on))?;
            w.end("commercial")?;
        }
        None => {}
    }
    w.end("application")
}

fn write_individual_profile(
    w: &mut MarkupWriter,
    profile: &IndividualProfile,
) -> Result<(), ExchangeError> {
    w.start("private", &[])?;
    w.opt_leaf("citizenship", profile.citizenship)?;
    w.opt_leaf("marriage", profile.marital_status)?;
    w.opt_leaf("dependants_bel18", profile.dependants_under_18)?;
    w.opt_leaf("dependants_und18", profile.dependants_over_18)?;
    w.opt_leaf("education", profile.education)?;
    w.opt_leaf("phone_mobile", profile.phone_mobile.as_deref())?;
    w.opt_leaf("phone_home", profile.phone_home.as_deref())?;
    w.opt_leaf("phone_work", profile.phone_work.as_deref())?;
    w.opt_leaf("email", profile.email.as_deref())?;
    if let Some(job) = &profile.employment {
        w.start("employment", &[])?;
        w.leaf("current", job.current)?;
        w.leaf("duration", job.duration_months)?;
        w.leaf("type", job.employment_type)?;
        w.leaf("profession", job.profession)?;
        w.opt_leaf("profession_text", job.profession_text.as_deref())?;
        if let Some(employer) = &job.employer {
            w.start("company", &[])?;
            w.leaf("name", &employer.name)?;
            w.leaf("state", employer.state)?;
            w.leaf("size", employer.size)?;
            w.leaf("area", employer.area)?;
            w.opt_leaf("area_text", employer.area_text.as_deref())?;
            w.end("company")?;
        }
        w.end("employment")?;
    }
    w.end("private")
}

fn write_address(
    w: &mut MarkupWriter,
    element: &str,
    total_element: &str,
    address: &Address,
) -> Result<(), ExchangeError> {
    w.start(element, &[])?;
    w.leaf("owner", address.owner)?;
    w.leaf("index", &address.postal_index)?;
    w.opt_leaf(total_element, address.one_line.as_deref())?;
    w.leaf("country", address.country)?;
    w.leaf("region", address.region)?;
    w.leaf("city", &address.city)?;
    w.opt_leaf("district", address.district.as_deref())?;
    w.leaf("street", &address.street)?;
    w.leaf("house", &address.house)?;
    w.opt_leaf("flat", address.flat.as_deref())?;
    w.end(element)
}

/// Serializes a response envelope, copying opaque sections byte for byte.
pub fn response_to_markup(envelope: &ResponseEnvelope, encoding: &str) -> Result<String, ExchangeError> {
    let mut w = MarkupWriter::with_declaration(encoding)?;
    w.start(
        "bki_response",
        &[
            ("version", envelope.version.as_str()),
            ("partnerid", envelope.partner_id.as_str()),
            ("datetime", envelope.timestamp.as_str()),
        ],
    )?;
    let response = &envelope.response;
    match &response.number {
        Some(num) => w.start("response", &[("num", num.as_str())])?,
        None => w.start("response", &[])?,
    }
    w.leaf("responsecode", response.code.code())?;
    w.leaf("responsestring", &response.text)?;
    for section in &response.sections {
        w.verbatim(section.kind.element_name(), &section.raw)?;
    }
    w.end("response")?;
    w.end("bki_response")?;
    w.finish()
}

// ============ Reading ============

fn malformed(msg: impl Into<String>) -> ExchangeError {
    ExchangeError::MalformedDocument(msg.into())
}

fn expect_root<'a>(root: &'a Element, name: &str) -> Result<&'a Element, ExchangeError> {
    if root.local_name() == name {
        Ok(root)
    } else {
        Err(malformed(format!("expected <{}>, found <{}>", name, root.name)))
    }
}

fn required<'a>(parent: &'a Element, name: &str) -> Result<&'a Element, ExchangeError> {
    parent
        .child(name)
        .ok_or_else(|| malformed(format!("<{}> is missing <{}>", parent.name, name)))
}

fn required_attr<'a>(el: &'a Element, name: &str) -> Result<&'a str, ExchangeError> {
    el.attr(name)
        .ok_or_else(|| malformed(format!("<{}> is missing attribute '{}'", el.name, name)))
}

fn text(parent: &Element, name: &str) -> Result<String, ExchangeError> {
    Ok(required(parent, name)?.text.clone())
}

fn opt_text(parent: &Element, name: &str) -> Option<String> {
    parent.child(name).map(|el| el.text.clone())
}

fn code<T: FromStr<Err = InvalidCode>>(parent: &Element, name: &str) -> Result<T, ExchangeError> {
    Ok(required(parent, name)?.text.trim().parse()?)
}

fn opt_code<T: FromStr<Err = InvalidCode>>(
    parent: &Element,
    name: &str,
) -> Result<Option<T>, ExchangeError> {
    parent
        .child(name)
        .map(|el| el.text.trim().parse().map_err(ExchangeError::from))
        .transpose()
}

fn parse_date(el: &Element, raw: &str) -> Result<NaiveDate, ExchangeError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| malformed(format!("<{}>: bad date '{}': {}", el.name, raw, e)))
}

fn date_of(parent: &Element, name: &str) -> Result<NaiveDate, ExchangeError> {
    let el = required(parent, name)?;
    parse_date(el, &el.text)
}

fn opt_date(parent: &Element, name: &str) -> Result<Option<NaiveDate>, ExchangeError> {
    parent.child(name).map(|el| parse_date(el, &el.text)).transpose()
}

fn parse_number<T: FromStr>(el: &Element) -> Result<T, ExchangeError>
where
    T::Err: std::fmt::Display,
{
    el.text
        .trim()
        .parse()
        .map_err(|e| malformed(format!("<{}>: bad number '{}': {}", el.name, el.text, e)))
}

fn number<T: FromStr>(parent: &Element, name: &str) -> Result<T, ExchangeError>
where
    T::Err: std::fmt::Display,
{
    parse_number(required(parent, name)?)
}

fn opt_number<T: FromStr>(parent: &Element, name: &str) -> Result<Option<T>, ExchangeError>
where
    T::Err: std::fmt::Display,
{
    parent.child(name).map(parse_number::<T>).transpose()
}

/// Parses a request envelope from Unicode markup.
pub fn request_from_markup(src: &str) -> Result<RequestEnvelope, ExchangeError> {
    let tree = markup::parse(src)?;
    let root = expect_root(&tree, "bki_request")?;
    let request = required(root, "request")?;

    Ok(RequestEnvelope {
        version: required_attr(root, "version")?.to_string(),
        partner_id: required_attr(root, "partnerid")?.to_string(),
        application: read_application(request)?,
    })
}

fn read_application(request: &Element) -> Result<ApplicationDocument, ExchangeError> {
    let num = required_attr(request, "num")?;
    let request_number = num
        .trim()
        .parse()
        .map_err(|_| malformed(format!("bad request number '{}'", num)))?;
    let report_date = parse_date(request, required_attr(request, "dateofreport")?)?;

    let subject = match (request.child("private"), request.child("commercial")) {
        (Some(person), None) => Subject::Person(read_person(person)?),
        (None, Some(entity)) => Subject::LegalEntity(read_legal_entity(entity)?),
        (Some(_), Some(_)) => return Err(malformed("request names both a person and a legal entity")),
        (None, None) => return Err(malformed("request has no subject")),
    };

    Ok(ApplicationDocument {
        request_number,
        report_date,
        report_type: text(request, "type")?,
        subject,
        reason: code(request, "reason")?,
        reason_text: opt_text(request, "reason_text"),
        application: request.child("application").map(read_details).transpose()?,
        registered_address: request
            .child("addr_reg")
            .map(|el| read_address(el, "addr_reg_total"))
            .transpose()?,
        actual_address: request
            .child("addr_fact")
            .map(|el| read_address(el, "addr_fact_total"))
            .transpose()?,
    })
}

fn read_person(el: &Element) -> Result<Person, ExchangeError> {
    let document = match el.child("doc") {
        Some(doc) => Some(IdentityDocument {
            doc_type: code(doc, "doctype")?,
            number: text(doc, "docno")?,
            issued_on: date_of(doc, "docdate")?,
            expires_on: opt_date(doc, "docenddate")?,
            issued_by: text(doc, "docplace")?,
        }),
        None => None,
    };

    Ok(Person {
        last_name: text(el, "lastname")?,
        first_name: text(el, "firstname")?,
        middle_name: opt_text(el, "middlename"),
        gender: opt_code(el, "gender")?,
        birthday: date_of(el, "birthday")?,
        birthplace: text(el, "birthplace")?,
        document,
        inn: opt_text(el, "inn"),
        snils: opt_text(el, "pfno"),
    })
}

fn read_legal_entity(el: &Element) -> Result<LegalEntity, ExchangeError> {
    Ok(LegalEntity {
        full_name: text(el, "fullname")?,
        short_name: opt_text(el, "shortname"),
        firm_name: opt_text(el, "firmname"),
        foreign_name: opt_text(el, "foreignname"),
        residency: code(el, "resident")?,
        registration_country: code(el, "regcountry")?,
        phone: opt_text(el, "phone"),
        inn: opt_text(el, "inn"),
        ogrn: opt_text(el, "egrn"),
    })
}

fn read_details(el: &Element) -> Result<ApplicationDetails, ExchangeError> {
    let credit = if el.child("cred_type").is_some() {
        Some(CreditTerms {
            credit_type: code(el, "cred_type")?,
            currency: code(el, "cred_currency")?,
            amount: number::<BigDecimal>(el, "cred_sum")?,
            deposit: opt_number(el, "cred_deposit")?,
            last_payment: opt_number(el, "cred_last_payment")?,
            periodic_payment: opt_number(el, "cred_sum_payment")?,
            duration_months: opt_number(el, "cred_duration")?,
            security: opt_code(el, "cred_security")?,
        })
    } else {
        None
    };

    let applicant = match (el.child("private"), el.child("commercial")) {
        (Some(profile), None) => Some(ApplicantProfile::Individual(read_individual_profile(profile)?)),
        (None, Some(profile)) => Some(ApplicantProfile::Company(CompanyProfile {
            state: code(profile, "company_state")?,
            size: code(profile, "company_size")?,
            area: code(profile, "company_area")?,
            area_text: opt_text(profile, "company_area_text"),
            registered_on: date_of(profile, "company_beginning_date")?,
        })),
        (Some(_), Some(_)) => {
            return Err(malformed("application names both an individual and a company profile"))
        }
        (None, None) => None,
    };

    Ok(ApplicationDetails {
        consent: code(el, "consent")?,
        consent_date: date_of(el, "consentdate")?,
        consent_end_date: date_of(el, "consentenddate")?,
        admin_liability_notice: code(el, "admcode_inform")?,
        consent_owner: opt_text(el, "consent_owner"),
        income: opt_number(el, "income")?,
        income_frequency: opt_code(el, "income_frequency")?,
        purpose: opt_code(el, "purpose")?,
        purpose_text: opt_text(el, "purpose_text"),
        number: opt_text(el, "application_num"),
        date: date_of(el, "application_date")?,
        credit,
        comment: opt_text(el, "comment"),
        applicant,
    })
}

fn read_individual_profile(el: &Element) -> Result<IndividualProfile, ExchangeError> {
    let employment = match el.child("employment") {
        Some(job) => {
            let employer = match job.child("company") {
                Some(company) => Some(Employer {
                    name: text(company, "name")?,
                    state: code(company, "state")?,
                    size: code(company, "size")?,
                    area: code(company, "area")?,
                    area_text: opt_text(company, "area_text"),
                }),
                None => None,
            };
            Some(Employment {
                current: code(job, "current")?,
                duration_months: number(job, "duration")?,
                employment_type: code(job, "type")?,
                profession: code(job, "profession")?,
                profession_text: opt_text(job, "profession_text"),
                employer,
            })
        }
        None => None,
    };

    Ok(IndividualProfile {
        citizenship: opt_code(el, "citizenship")?,
        marital_status: opt_code(el, "marriage")?,
        dependants_under_18: opt_number(el, "dependants_bel18")?,
        dependants_over_18: opt_number(el, "dependants_und18")?,
        education: opt_code(el, "education")?,
        phone_mobile: opt_text(el, "phone_mobile"),
        phone_home: opt_text(el, "phone_home"),
        phone_work: opt_text(el, "phone_work"),
        email: opt_text(el, "email"),
        employment,
    })
}

fn read_address(el: &Element, total_element: &str) -> Result<Address, ExchangeError> {
    Ok(Address {
        owner: code(el, "owner")?,
        postal_index: text(el, "index")?,
        one_line: opt_text(el, total_element),
        country: code(el, "country")?,
        region: code(el, "region")?,
        city: text(el, "city")?,
        district: opt_text(el, "district"),
        street: text(el, "street")?,
        house: text(el, "house")?,
        flat: opt_text(el, "flat"),
    })
}

/// Parses a reply from Unicode markup.
///
/// The four report sections are cut out of `src` verbatim; nothing inside them
/// is interpreted. Missing sections are simply absent from `sections`.
pub fn response_from_markup(src: &str) -> Result<ResponseEnvelope, ExchangeError> {
    let tree = markup::parse(src)?;
    let root = expect_root(&tree, "bki_response")?;
    let response = required(root, "response")?;

    let sections = response
        .children
        .iter()
        .filter_map(|child| {
            SectionKind::from_element_name(child.local_name()).map(|kind| OpaqueSection {
                kind,
                raw: src.as_bytes()[child.inner.clone()].to_vec(),
            })
        })
        .collect();

    Ok(ResponseEnvelope {
        version: required_attr(root, "version")?.to_string(),
        partner_id: required_attr(root, "partnerid")?.to_string(),
        timestamp: root.attr("datetime").unwrap_or_default().to_string(),
        response: ReportResponse {
            number: response.attr("num").map(str::to_string),
            code: ResponseCode::from_code(required(response, "responsecode")?.text.trim()),
            text: opt_text(response, "responsestring").unwrap_or_default(),
            sections,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::*;

    fn minimal() -> RequestEnvelope {
        RequestEnvelope::new(
            "PARTNER-1",
            ApplicationDocument::new(
                7,
                NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                "1",
                Subject::Person(Person {
                    last_name: "Бендер".into(),
                    first_name: "Остап".into(),
                    middle_name: None,
                    gender: None,
                    birthday: NaiveDate::from_ymd_opt(1970, 2, 1).unwrap(),
                    birthplace: "Калининград".into(),
                    document: None,
                    inn: None,
                    snils: None,
                }),
                RequestReason::CreditApplication,
            ),
        )
    }

    #[test]
    fn test_minimal_request_layout() {
        let xml = request_to_markup(&minimal(), "windows-1251").unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="windows-1251"?>"#));
        assert!(xml.contains(r#"<bki_request version="3.4" partnerid="PARTNER-1">"#));
        assert!(xml.contains(r#"<request num="7" dateofreport="2024-03-05">"#));
        assert!(xml.contains("<lastname>Бендер</lastname>"));
        assert!(xml.contains("<reason>1</reason><type>1</type></request>"));
        // absent optionals are omitted, not emitted empty
        assert!(!xml.contains("middlename"));
        assert!(!xml.contains("application"));
        assert!(!xml.contains("addr_reg"));
    }

    #[test]
    fn test_request_round_trip() {
        let envelope = minimal();
        let xml = request_to_markup(&envelope, "UTF-8").unwrap();
        assert_eq!(request_from_markup(&xml).unwrap(), envelope);
    }

    #[test]
    fn test_invalid_code_rejected_on_read() {
        let xml = request_to_markup(&minimal(), "UTF-8")
            .unwrap()
            .replace("<reason>1</reason>", "<reason>77</reason>");
        assert!(matches!(
            request_from_markup(&xml),
            Err(ExchangeError::InvalidEnumeration(_))
        ));
    }

    #[test]
    fn test_response_sections_are_verbatim() {
        let src = concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<bki_response version="3.4" partnerid="P" datetime="2024-03-05T10:00:00">"#,
            r#"<response num="7"><responsecode>0</responsecode><responsestring>ok</responsestring>"#,
            "<title_part>\n  <a x=\"1\">Иванов &amp; Ко</a>\n</title_part>",
            "<base_part/>",
            "<information_parts><!-- note --><b>1</b></information_parts>",
            "</response></bki_response>"
        );
        let envelope = response_from_markup(src).unwrap();
        let response = &envelope.response;
        assert_eq!(response.code, ResponseCode::Accepted);
        assert_eq!(response.text, "ok");
        assert_eq!(response.number.as_deref(), Some("7"));
        assert_eq!(
            response.section(SectionKind::Title).unwrap().as_str(),
            Some("\n  <a x=\"1\">Иванов &amp; Ко</a>\n")
        );
        assert_eq!(response.section(SectionKind::Base).unwrap().raw, b"");
        assert!(response.section(SectionKind::Supplementary).is_none());
        assert_eq!(
            response.section(SectionKind::InformationParts).unwrap().raw,
            b"<!-- note --><b>1</b>"
        );

        let again = response_from_markup(&response_to_markup(&envelope, "UTF-8").unwrap()).unwrap();
        assert_eq!(again, envelope);
    }

    #[test]
    fn test_malformed_response() {
        assert!(matches!(
            response_from_markup("<bki_response><response>"),
            Err(ExchangeError::MalformedDocument(_))
        ));
        assert!(matches!(
            response_from_markup(r#"<bki_request version="3.4" partnerid="P"/>"#),
            Err(ExchangeError::MalformedDocument(_))
        ));
    }
}
