//! Validation through a live session

use formsheet::prelude::*;
use formsheet::RecordingNotifier;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

/// A single editable amount cell in B2 under a header row
fn amount_session(rule_message: Option<&str>, data: Value) -> FormSession<RecordingNotifier> {
    let mut templates = Workbook::with_sheet("Amounts").unwrap();
    let sheet = templates.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", "Label").unwrap();
    sheet.set_cell_value("B1", "Amount").unwrap();
    sheet.set_cell_value("A2", "${label}").unwrap();
    sheet.set_cell_value("B2", "${amount}").unwrap();

    let mut config = SheetConfiguration::new("Amounts", "Amounts", ConfigRange::parse("A2:B2").unwrap());
    config.header_range = Some(ConfigRange::parse("A1:B1").unwrap());
    config.validations.push(ValidationRule::new("B2", "$value > 0", rule_message));
    config.error_suffix = Some("Error".into());

    FormSession::open(
        templates,
        vec![config],
        data,
        SessionSettings::with_client_id("amounts"),
        RecordingNotifier::new(),
    )
    .unwrap()
}

#[test]
fn test_negative_value_fails_rule_with_its_message() {
    let mut session = amount_session(Some("Amount must be positive"), json!({"label": "x", "amount": 5}));
    session.on_value_change(1, 1, "-1").unwrap();

    assert!(!session.validate_cell(1, 1, false));
    let cell = session.cache().get(1, 1).unwrap();
    assert_eq!(cell.status, ValidationStatus::Invalid);
    assert_eq!(cell.message.as_deref(), Some("Amount must be positive"));
}

#[test]
fn test_negative_value_fails_rule_with_default_message() {
    let mut session = amount_session(None, json!({"label": "x", "amount": 5}));
    session.on_value_change(1, 1, "-1").unwrap();

    assert!(!session.validate_cell(1, 1, false));
    assert_eq!(
        session.cache().get(1, 1).and_then(|c| c.message.clone()).as_deref(),
        Some("Invalid input")
    );
}

#[test]
fn test_each_call_leaves_valid_or_invalid() {
    let mut session = amount_session(None, json!({"label": "x", "amount": 5}));
    assert_eq!(session.cache().status(1, 1), ValidationStatus::Unvalidated);

    assert!(session.validate_cell(1, 1, false));
    assert_eq!(session.cache().status(1, 1), ValidationStatus::Valid);
    assert!(session.validate_cell(1, 0, false));
    assert_eq!(session.cache().status(1, 0), ValidationStatus::Valid);
}

#[test]
fn test_pass_empty_overrides_rules() {
    let mut session = amount_session(None, json!({"label": "x", "amount": null}));
    assert!(session.validate_cell(1, 1, true));
    assert_eq!(session.cache().status(1, 1), ValidationStatus::Valid);

    assert!(session.on_value_change(1, 1, "").unwrap());
}

#[test]
fn test_error_message_in_data_wins_over_rules() {
    let mut session = amount_session(
        Some("Amount must be positive"),
        json!({"label": "x", "amount": 5, "amountError": "Amount was rejected upstream"}),
    );
    assert!(!session.validate_cell(1, 1, false));
    assert_eq!(
        session.cache().get(1, 1).and_then(|c| c.message.clone()).as_deref(),
        Some("Amount was rejected upstream")
    );
    assert!(session.validate_cell(1, 0, false));
}

#[test]
fn test_only_flips_request_renders() {
    let mut session = amount_session(None, json!({"label": "x", "amount": 5}));
    assert!(session.validate_all_visible(false));
    assert!(session.notifier().targets.is_empty());

    assert!(!session.on_value_change(1, 1, "0").unwrap());
    assert!(!session.on_value_change(1, 1, "-3").unwrap());
    assert!(session.on_value_change(1, 1, "3").unwrap());

    let ids: Vec<String> = session
        .notifier_mut()
        .drain()
        .iter()
        .map(RenderTarget::component_id)
        .collect();
    assert_eq!(ids, vec!["amounts:0:group1".to_string(), "amounts:0:group1".to_string()]);
}

#[test]
fn test_no_requests_without_client_id() {
    let mut templates = Workbook::with_sheet("S").unwrap();
    templates.worksheet_mut(0).unwrap().set_cell_value("A1", 5.0).unwrap();
    let mut config = SheetConfiguration::new("S", "S", ConfigRange::parse("A1").unwrap());
    config.validations.push(ValidationRule::new("A1", "$value > 10", None));

    let mut session = FormSession::open(
        templates,
        vec![config],
        json!({}),
        SessionSettings::default(),
        RecordingNotifier::new(),
    )
    .unwrap();
    assert!(!session.validate_cell(0, 0, false));
    assert!(session.notifier().targets.is_empty());
}
