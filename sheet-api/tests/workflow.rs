use std::collections::BTreeSet;
use std::fs;

use chrono::{NaiveDate, NaiveDateTime};
use sheet_api::{
    ApiError, Gateway, LookupOutcome, MemoryNotifier, MemoryTransport, Method, NoticeLevel,
    SheetClient,
};
use sheet_core::{
    CellKey, FieldRegistry, Form, FormSession, HeaderField, SheetConfig, SheetError, SheetLayout,
};

type TestClient = SheetClient<MemoryTransport, MemoryNotifier>;

fn read_fixture(name: &str) -> String {
    let path = format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"));
    fs::read_to_string(path).expect("fixture should be readable")
}

fn registry() -> FieldRegistry {
    let layout: SheetLayout =
        serde_json::from_str(&read_fixture("sheet_layout.json")).expect("layout should parse");
    FieldRegistry::from_layout(layout, &SheetConfig::default()).expect("layout should be valid")
}

fn client(transport: MemoryTransport) -> TestClient {
    let config = SheetConfig::default();
    let gateway = Gateway::new(transport, MemoryNotifier::new(), &config);
    SheetClient::new(gateway, registry(), config)
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    today().and_hms_opt(hour, minute, 0).unwrap()
}

/// Backend that accepts a new patient, a new form and every measurement, and
/// serves them back for the summary refresh.
fn accepting_backend() -> MemoryTransport {
    MemoryTransport::new()
        .route(Method::Post, "/api/pacientes/", 201, &read_fixture("patient.json"))
        .route(Method::Put, "/api/pacientes/3/", 200, &read_fixture("patient.json"))
        .route(Method::Post, "/api/formularios/", 201, &read_fixture("form_write.json"))
        .route(Method::Put, "/api/formularios/7/", 200, &read_fixture("form_write.json"))
        .route(Method::Post, "/api/mediciones/", 201, "{}")
        .route(Method::Get, "/api/formularios/7/", 200, &read_fixture("form.json"))
        .route(Method::Get, "/api/pacientes/3/", 200, &read_fixture("patient.json"))
        .route(
            Method::Get,
            "/api/formularios/7/mediciones/",
            200,
            &read_fixture("form_measurements.json"),
        )
}

fn filled_session(client: &TestClient) -> FormSession {
    let mut session = client
        .new_session()
        .with_value(HeaderField::ClinicalRecordNumber, "HC-2024-118")
        .with_value(HeaderField::Identifier, "1093456789")
        .with_value(HeaderField::Names, "María Fernanda López")
        .with_value(HeaderField::BirthDate, "1997-02-10")
        .with_value(HeaderField::Version, "1")
        .with_value(HeaderField::Status, "g")
        .with_value(HeaderField::Responsible, "Enf. Carolina Ríos");

    let grid = session.grid_mut();
    grid.set_column_time(0, Some(at(9, 0))).unwrap();
    grid.set_cell(CellKey::new(1, 1, 0), "120").unwrap();
    grid.set_cell(CellKey::new(1, 2, 0), "80").unwrap();
    grid.set_cell(CellKey::new(2, 3, 0), "140").unwrap();
    // No timestamp in column 1, so this one is never sent.
    grid.set_cell(CellKey::new(2, 3, 1), "150").unwrap();
    session
}

fn measurement_posts(client: &TestClient) -> usize {
    client
        .gateway()
        .transport()
        .requests()
        .iter()
        .filter(|request| request.method == Method::Post && request.path() == "/api/mediciones/")
        .count()
}

#[tokio::test]
async fn new_sheet_is_saved_in_order_and_session_cleared() {
    let client = client(accepting_backend());
    let session = filled_session(&client);

    let report = client.save(session, false, today()).await.expect("save");

    assert!(!report.updated);
    assert_eq!(report.patient.id, 3);
    assert_eq!(report.form.id, 7);
    assert_eq!(report.form.fields.patient_id, 3);
    assert_eq!(report.form.fields.insurer_id, Some(2));
    assert_eq!(report.submitted_groups, 2);
    assert_eq!(measurement_posts(&client), 2);
    assert!(report.summary.is_some());
    assert_eq!(report.session, client.new_session());

    let requests = client.gateway().transport().requests();
    let paths: Vec<&str> = requests.iter().take(2).map(|request| request.path()).collect();
    assert_eq!(paths, ["/api/pacientes/", "/api/formularios/"]);
    let form_body = requests[1].body.as_deref().unwrap();
    assert!(form_body.contains(r#""paciente":3"#));
    assert!(form_body.contains(r#""codigo":"FRSPA-022""#));
    assert!(form_body.contains(r#""fecha_elabora":"2024-06-15""#));

    let notice = client.gateway().notifier().last().unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.message, "Datos guardados correctamente");
}

#[tokio::test]
async fn editing_a_stored_form_needs_confirmation() {
    let client = client(accepting_backend());
    let form: Form = serde_json::from_str(&read_fixture("form.json")).unwrap();
    let session = filled_session(&client).with_form(&form);

    let err = client
        .save(session.clone(), false, today())
        .await
        .unwrap_err();
    assert!(matches!(err.error, ApiError::ConfirmationRequired));
    assert_eq!(err.session, session);
    assert!(client.gateway().transport().requests().is_empty());

    let report = client.save(session, true, today()).await.expect("save");
    assert!(report.updated);
    let requests = client.gateway().transport().requests();
    assert_eq!(requests[0].method, Method::Put);
    assert_eq!(requests[0].path(), "/api/pacientes/3/");
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Datos actualizados correctamente"
    );
}

#[tokio::test]
async fn missing_header_fields_stop_before_any_request() {
    let client = client(accepting_backend());
    let session = client
        .new_session()
        .with_value(HeaderField::Names, "María Fernanda López");

    let err = client.save(session, false, today()).await.unwrap_err();
    assert!(matches!(
        err.error,
        ApiError::Validation(SheetError::MissingFields(_))
    ));
    assert_eq!(
        err.session.header().get(HeaderField::Names),
        Some("María Fernanda López")
    );
    assert!(client.gateway().transport().requests().is_empty());
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Complete los campos requeridos"
    );
}

#[tokio::test]
async fn rejected_measurement_names_its_group_and_keeps_ids() {
    let transport = MemoryTransport::new()
        .route(Method::Post, "/api/pacientes/", 201, &read_fixture("patient.json"))
        .route(Method::Post, "/api/formularios/", 201, &read_fixture("form_write.json"))
        .route_when(
            Method::Post,
            "/api/mediciones/",
            r#""parametro":2"#,
            400,
            r#"{"detail": "Parámetro inválido"}"#,
        )
        .route(Method::Post, "/api/mediciones/", 201, "{}");
    let client = client(transport);

    let err = client
        .save(filled_session(&client), false, today())
        .await
        .unwrap_err();

    match &err.error {
        ApiError::MeasurementGroup {
            parameter_id,
            column,
            source,
        } => {
            assert_eq!((*parameter_id, *column), (2, 0));
            assert_eq!(source.status(), Some(400));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.session.patient_id(), Some(3));
    assert_eq!(err.session.form_id(), Some(7));
    assert_eq!(
        err.session.header().get(HeaderField::Names),
        Some("María Fernanda López")
    );

    let messages: Vec<String> = client
        .gateway()
        .notifier()
        .notices()
        .into_iter()
        .map(|notice| notice.message)
        .collect();
    assert!(messages.contains(&"Parámetro inválido".to_string()));
    assert_eq!(messages.last().unwrap(), "Error al guardar formulario");
}

#[tokio::test]
async fn summary_failure_does_not_fail_the_save() {
    let transport = MemoryTransport::new()
        .route(Method::Post, "/api/pacientes/", 201, &read_fixture("patient.json"))
        .route(Method::Post, "/api/formularios/", 201, &read_fixture("form_write.json"))
        .route(Method::Post, "/api/mediciones/", 201, "{}");
    let client = client(transport);

    let report = client
        .save(filled_session(&client), false, today())
        .await
        .expect("save");
    assert!(report.summary.is_none());
    assert_eq!(
        client.gateway().notifier().last().unwrap().level,
        NoticeLevel::Success
    );
}

#[tokio::test]
async fn lookup_loads_form_patient_and_locked_grid() {
    let transport = accepting_backend().route(
        Method::Get,
        "/api/formularios/",
        200,
        &read_fixture("forms_by_document.json"),
    );
    let client = client(transport);

    let report = client
        .lookup_by_document(client.new_session(), " 1093456789 ", today())
        .await
        .expect("lookup");

    assert_eq!(report.outcome, LookupOutcome::Form { form_id: 7 });
    let session = &report.session;
    assert!(session.is_update());
    assert_eq!(session.patient_id(), Some(3));
    assert_eq!(session.header().get(HeaderField::BloodType), Some("O+"));
    assert_eq!(session.header().get(HeaderField::AgeSnapshot), Some("27"));
    assert_eq!(session.header().get(HeaderField::Responsible), Some("Enf. Carolina Ríos"));
    assert_eq!(session.grid().locked_columns(), BTreeSet::from([0, 1, 2]));
    assert!(report.summary.is_some());

    let first = &client.gateway().transport().requests()[0];
    assert!(first
        .url
        .starts_with("/api/formularios/?paciente__num_identificacion=1093456789&_="));
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Datos encontrados"
    );
}

#[tokio::test]
async fn lookup_keeps_the_form_when_measurements_fail() {
    let transport = MemoryTransport::new()
        .route(
            Method::Get,
            "/api/formularios/",
            200,
            &read_fixture("forms_by_document.json"),
        )
        .route(Method::Get, "/api/pacientes/3/", 200, &read_fixture("patient.json"))
        .route(Method::Get, "/api/formularios/7/mediciones/", 500, "");
    let client = client(transport);

    let report = client
        .lookup_by_document(client.new_session(), "1093456789", today())
        .await
        .expect("lookup");

    assert_eq!(report.outcome, LookupOutcome::Form { form_id: 7 });
    assert!(report.session.grid().locked_columns().is_empty());
    let messages: Vec<String> = client
        .gateway()
        .notifier()
        .notices()
        .into_iter()
        .map(|notice| notice.message)
        .collect();
    assert!(messages.contains(&"Error al cargar mediciones guardadas".to_string()));
    assert_eq!(messages.last().unwrap(), "Datos encontrados");
}

#[tokio::test]
async fn lookup_falls_back_to_patient_record() {
    let transport = MemoryTransport::new()
        .route(Method::Get, "/api/formularios/", 200, "[]")
        .route(
            Method::Get,
            "/api/pacientes/",
            200,
            &read_fixture("patients_by_document.json"),
        );
    let client = client(transport);

    let report = client
        .lookup_by_document(client.new_session(), "1093456789", today())
        .await
        .expect("lookup");

    assert_eq!(report.outcome, LookupOutcome::PatientOnly { patient_id: 3 });
    assert!(!report.session.is_update());
    assert_eq!(report.session.form_id(), None);
    assert_eq!(report.session.header().get(HeaderField::AgeSnapshot), Some("27"));
    let notice = client.gateway().notifier().last().unwrap();
    assert_eq!(notice.level, NoticeLevel::Info);
    assert!(notice.message.starts_with("Paciente encontrado."));
}

#[tokio::test]
async fn lookup_without_matches_keeps_the_document() {
    let transport = MemoryTransport::new()
        .route(Method::Get, "/api/formularios/", 200, r#"{"results": []}"#)
        .route(Method::Get, "/api/pacientes/", 200, "[]");
    let client = client(transport);

    let stale = filled_session(&client);
    let report = client
        .lookup_by_document(stale, "555", today())
        .await
        .expect("lookup");

    assert_eq!(report.outcome, LookupOutcome::NotFound);
    assert_eq!(report.summary, None);
    assert_eq!(report.session.header().get(HeaderField::Identifier), Some("555"));
    assert_eq!(report.session.header().get(HeaderField::Names), None);
    assert!(report.session.grid().cells().all(|(_, cell)| cell.value.is_empty()));
}

#[tokio::test]
async fn blank_document_is_rejected_locally() {
    let client = client(MemoryTransport::new());
    let err = client
        .lookup_by_document(client.new_session(), "   ", today())
        .await
        .unwrap_err();
    assert!(matches!(err.error, ApiError::Validation(_)));
    assert!(client.gateway().transport().requests().is_empty());
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Ingrese el documento del paciente"
    );
}

#[tokio::test]
async fn patient_search_prefers_identifier() {
    let transport = MemoryTransport::new().route(
        Method::Get,
        "/api/pacientes/",
        200,
        &read_fixture("patients_by_document.json"),
    );
    let client = client(transport);
    let session = client
        .new_session()
        .with_value(HeaderField::Identifier, "1093456789")
        .with_value(HeaderField::ClinicalRecordNumber, "HC-X");

    let report = client.search_patient(session, today()).await.expect("search");

    assert_eq!(report.outcome, LookupOutcome::PatientOnly { patient_id: 3 });
    assert_eq!(
        report.session.header().get(HeaderField::ClinicalRecordNumber),
        Some("HC-2024-118")
    );
    let request = &client.gateway().transport().requests()[0];
    assert!(request.url.contains("num_identificacion=1093456789"));
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Paciente encontrado"
    );
}

#[tokio::test]
async fn patient_search_miss_keeps_search_values() {
    let transport = MemoryTransport::new().route(Method::Get, "/api/pacientes/", 200, "[]");
    let client = client(transport);
    let session = client
        .new_session()
        .with_value(HeaderField::ClinicalRecordNumber, "HC-404")
        .with_value(HeaderField::Names, "Otra");

    let report = client.search_patient(session, today()).await.expect("search");

    assert_eq!(report.outcome, LookupOutcome::NotFound);
    assert_eq!(
        report.session.header().get(HeaderField::ClinicalRecordNumber),
        Some("HC-404")
    );
    assert_eq!(report.session.header().get(HeaderField::Names), None);
    let request = &client.gateway().transport().requests()[0];
    assert!(request.url.contains("num_historia_clinica=HC-404"));
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Paciente no encontrado"
    );
}

#[tokio::test]
async fn patient_search_needs_a_key() {
    let client = client(MemoryTransport::new());
    let err = client
        .search_patient(client.new_session(), today())
        .await
        .unwrap_err();
    assert!(matches!(err.error, ApiError::Validation(_)));
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Ingrese número de identificación o historia clínica"
    );
}

#[tokio::test]
async fn insurer_failure_is_notified() {
    let client = client(MemoryTransport::new().route(Method::Get, "/api/aseguradoras/", 503, ""));
    let err = client.load_insurers().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Error al cargar aseguradoras"
    );
}

#[test]
fn print_target_prefers_form_then_patient() {
    let client = client(MemoryTransport::new());
    let form: Form = serde_json::from_str(&read_fixture("form.json")).unwrap();

    let session = client.new_session().with_form(&form);
    assert_eq!(
        client.print_target(&session).unwrap(),
        "/formulario/7/impresion/"
    );

    let session = client.new_session().with_patient_id(3);
    assert_eq!(client.print_target(&session).unwrap(), "/pacientes/3/pdf/");

    let err = client.print_target(&client.new_session()).unwrap_err();
    assert!(matches!(err, ApiError::NothingToPrint));
    assert_eq!(
        client.gateway().notifier().last().unwrap().message,
        "Busque un paciente o formulario para imprimir"
    );
}
