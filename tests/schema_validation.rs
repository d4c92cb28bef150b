/// Integration tests for the optional schema stage
/// Uses a request schema on disk and a mocked gateway to check what gets sent
use std::io::Write;
use std::path::Path;

use bki_exchange::charset;
use bki_exchange::codes::{DocumentType, Gender, RequestReason};
use bki_exchange::document;
use bki_exchange::errors::ExchangeError;
use bki_exchange::models::{
    ApplicationDocument, IdentityDocument, Person, RequestEnvelope, ReportResponse, ResponseCode,
    ResponseEnvelope, Subject,
};
use bki_exchange::schema::SchemaValidator;
use bki_exchange::signing;
use bki_exchange::{BkiGatewayClient, Certificate, ClientConfig};
use chrono::NaiveDate;
use tempfile::NamedTempFile;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const REQUEST_SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" elementFormDefault="qualified">
  <xs:simpleType name="CyrillicName">
    <xs:restriction base="xs:string">
      <xs:pattern value="[А-ЯЁа-яё\- ]+"/>
      <xs:maxLength value="50"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="Inn">
    <xs:restriction base="xs:string">
      <xs:pattern value="\d{10}|\d{12}"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="Reason">
    <xs:restriction base="xs:string">
      <xs:enumeration value="1"/>
      <xs:enumeration value="2"/>
      <xs:enumeration value="3"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:complexType name="Doc">
    <xs:sequence>
      <xs:element name="doctype" type="xs:string"/>
      <xs:element name="docno">
        <xs:simpleType>
          <xs:restriction base="xs:string">
            <xs:length value="10"/>
          </xs:restriction>
        </xs:simpleType>
      </xs:element>
      <xs:element name="docdate" type="xs:date"/>
      <xs:element name="docenddate" type="xs:date" minOccurs="0"/>
      <xs:element name="docplace" type="xs:string"/>
    </xs:sequence>
  </xs:complexType>
  <xs:complexType name="Private">
    <xs:sequence>
      <xs:element name="lastname" type="CyrillicName"/>
      <xs:element name="firstname" type="CyrillicName"/>
      <xs:element name="middlename" type="CyrillicName" minOccurs="0"/>
      <xs:element name="gender" minOccurs="0">
        <xs:simpleType>
          <xs:restriction base="xs:positiveInteger">
            <xs:maxInclusive value="2"/>
          </xs:restriction>
        </xs:simpleType>
      </xs:element>
      <xs:element name="birthday" type="xs:date"/>
      <xs:element name="birthplace" type="xs:string"/>
      <xs:element name="doc" type="Doc" minOccurs="0"/>
      <xs:element name="inn" type="Inn" minOccurs="0"/>
      <xs:element name="pfno" type="xs:string" minOccurs="0"/>
    </xs:sequence>
  </xs:complexType>
  <xs:element name="bki_request">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="request">
          <xs:complexType>
            <xs:sequence>
              <xs:choice>
                <xs:element name="private" type="Private"/>
                <xs:element name="commercial" type="xs:anyType"/>
              </xs:choice>
              <xs:element name="reason" type="Reason"/>
              <xs:element name="reason_text" type="xs:string" minOccurs="0"/>
              <xs:element name="application" type="xs:anyType" minOccurs="0"/>
              <xs:element name="addr_reg" type="xs:anyType" minOccurs="0"/>
              <xs:element name="addr_fact" type="xs:anyType" minOccurs="0"/>
              <xs:element name="type" type="xs:string"/>
            </xs:sequence>
            <xs:attribute name="num" type="xs:unsignedInt" use="required"/>
            <xs:attribute name="dateofreport" type="xs:date" use="required"/>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
      <xs:attribute name="version" type="xs:string" use="required"/>
      <xs:attribute name="partnerid" type="xs:token" use="required"/>
    </xs:complexType>
  </xs:element>
</xs:schema>
"#;

fn schema_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(REQUEST_SCHEMA.as_bytes()).unwrap();
    file
}

fn person() -> Person {
    Person {
        last_name: "Сидорова".into(),
        first_name: "Анна".into(),
        middle_name: None,
        gender: Some(Gender::Female),
        birthday: NaiveDate::from_ymd_opt(1990, 9, 30).unwrap(),
        birthplace: "г. Казань".into(),
        document: Some(IdentityDocument {
            doc_type: DocumentType::ALL[0],
            number: "4510123456".into(),
            issued_on: NaiveDate::from_ymd_opt(2010, 10, 15).unwrap(),
            expires_on: None,
            issued_by: "ОВД Вахитовского района".into(),
        }),
        inn: Some("165512345678".into()),
        snils: None,
    }
}

fn application(person: Person, reason: RequestReason) -> ApplicationDocument {
    ApplicationDocument::new(
        501,
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        "1",
        Subject::Person(person),
        reason,
    )
}

fn wire_request(application: ApplicationDocument) -> Vec<u8> {
    let envelope = RequestEnvelope::new("PARTNER-7", application);
    let charset = charset::default_wire_charset();
    let markup = document::request_to_markup(&envelope, charset.name()).unwrap();
    charset::encode_to_wire(&markup, charset).unwrap()
}

fn mentions(messages: &[String], element: &str) -> bool {
    let quoted = format!("Element '{}'", element);
    messages.iter().any(|m| m.contains(&quoted))
}

fn violations(result: Result<(), ExchangeError>) -> Vec<String> {
    match result {
        Ok(()) => Vec::new(),
        Err(ExchangeError::ValidationError { messages }) => messages,
        Err(other) => panic!("expected ValidationError, got {other}"),
    }
}

#[test]
fn test_conforming_request_passes() {
    let schema = schema_file();
    let mut validator = SchemaValidator::load(schema.path()).unwrap();
    let found = violations(validator.validate(&wire_request(application(person(), RequestReason::CreditApplication))));
    assert!(found.is_empty(), "{:#?}", found);
}

#[test]
fn test_all_independent_violations_are_reported() {
    let schema = schema_file();
    let mut validator = SchemaValidator::load(schema.path()).unwrap();

    let mut bad = person();
    bad.last_name = "Sidorova".into();
    bad.inn = Some("12".into());
    if let Some(doc) = bad.document.as_mut() {
        doc.number = "45 10".into();
    }
    let found = violations(validator.validate(&wire_request(application(bad, RequestReason::Other))));

    for element in ["lastname", "inn", "docno", "reason"] {
        assert!(
            mentions(&found, element),
            "no violation for {} in {:#?}",
            element,
            found
        );
    }
    for element in ["firstname", "birthday", "docdate", "type"] {
        assert!(!mentions(&found, element), "{} wrongly flagged in {:#?}", element, found);
    }
}

#[test]
fn test_missing_schema_is_unavailable() {
    assert!(matches!(
        SchemaValidator::load(Path::new("/definitely/not/here.xsd")),
        Err(ExchangeError::SchemaUnavailable(_))
    ));
}

#[tokio::test]
async fn test_invalid_request_is_never_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let schema = schema_file();
    let config = ClientConfig::new(server.uri(), "PARTNER-7").with_schema(schema.path());
    let client = BkiGatewayClient::new(config, Certificate::from_seed([1; 32])).unwrap();

    let mut bad = person();
    bad.first_name = "Anna".into();
    let err = client
        .exchange(application(bad, RequestReason::CreditApplication))
        .await
        .unwrap_err();
    let found = violations(Err(err));
    assert!(mentions(&found, "firstname"), "{:#?}", found);
    assert!(!mentions(&found, "lastname"), "{:#?}", found);
}

#[tokio::test]
async fn test_unreadable_schema_aborts_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut broken = NamedTempFile::new().unwrap();
    broken.write_all(b"<xs:schema xmlns:xs='x'><xs:element").unwrap();
    let config = ClientConfig::new(server.uri(), "PARTNER-7").with_schema(broken.path());
    let client = BkiGatewayClient::new(config, Certificate::from_seed([1; 32])).unwrap();

    assert!(matches!(
        client.exchange(application(person(), RequestReason::CreditApplication)).await,
        Err(ExchangeError::SchemaUnavailable(_))
    ));
}

#[tokio::test]
async fn test_valid_request_is_sent_and_audited() {
    let server = MockServer::start().await;
    let gateway = Certificate::from_seed([42; 32]);
    let reply_markup = document::response_to_markup(
        &ResponseEnvelope {
            version: "3.4".into(),
            partner_id: "PARTNER-7".into(),
            timestamp: "2024-06-01T09:30:00".into(),
            response: ReportResponse {
                number: Some("501".into()),
                code: ResponseCode::Accepted,
                text: "OK".into(),
                sections: Vec::new(),
            },
        },
        "windows-1251",
    )
    .unwrap();
    let reply = signing::sign(
        &charset::encode_to_wire(&reply_markup, charset::default_wire_charset()).unwrap(),
        &gateway,
    )
    .unwrap();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(reply))
        .expect(1)
        .mount(&server)
        .await;

    let schema = schema_file();
    let audit_dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(server.uri(), "PARTNER-7")
        .with_schema(schema.path())
        .with_audit_dir(audit_dir.path())
        .with_trusted_gateway_key(hex::encode(gateway.public_key().as_bytes()));
    let client = BkiGatewayClient::new(config, Certificate::from_seed([1; 32])).unwrap();

    let response = client
        .exchange(application(person(), RequestReason::CreditApplication))
        .await
        .unwrap();
    assert!(response.code.is_accepted());

    let saved: Vec<_> = std::fs::read_dir(audit_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].extension().and_then(|e| e.to_str()), Some("sig"));

    let received = server.received_requests().await.unwrap();
    assert_eq!(std::fs::read(&saved[0]).unwrap(), received[0].body);
}
