//! Multi-tab sessions: edits, recalculation, caching and pre-save checks

use formsheet::prelude::*;
use formsheet::{CellComment, RecordingNotifier};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn range(text: &str) -> ConfigRange {
    ConfigRange::parse(text).unwrap()
}

/// Sheets: Customer (one name field), Orders (repeated lines with a
/// total), Rates (lookup values, not a tab)
fn templates() -> Workbook {
    let mut wb = Workbook::with_sheet("Customer").unwrap();
    let customer = wb.worksheet_mut(0).unwrap();
    customer.set_cell_value("A1", "Name").unwrap();
    customer.set_cell_value("B1", "${customer.name}").unwrap();

    wb.add_worksheet_with_name("Orders").unwrap();
    let orders = wb.worksheet_mut(1).unwrap();
    orders.set_cell_value("A1", "Item").unwrap();
    orders.set_cell_value("B1", "Qty").unwrap();
    orders.set_cell_value("C1", "Cost").unwrap();
    orders.set_cell_value("A2", "${o.item}").unwrap();
    orders.set_cell_value("B2", "${o.qty}").unwrap();
    orders.set_cell_formula("C2", "=B2*Rates!B1").unwrap();
    orders.set_cell_value("A3", "Total").unwrap();
    orders.set_cell_formula("C3", "=SUM(C2)").unwrap();

    wb.add_worksheet_with_name("Rates").unwrap();
    let rates = wb.worksheet_mut(2).unwrap();
    rates.set_cell_value("A1", "Unit price").unwrap();
    rates.set_cell_value("B1", 2.5).unwrap();
    wb
}

fn configs() -> Vec<SheetConfiguration> {
    let mut customer = SheetConfiguration::new("Customer", "Customer", range("A1:B1"));
    customer
        .validations
        .push(ValidationRule::new("B1", r#"$value <> """#, Some("Name is required")));

    let mut orders = SheetConfiguration::new("Orders", "Orders", range("A2:C3"));
    orders.header_range = Some(range("A1:C1"));
    orders.max_rows_per_page = 2;
    orders.commands.push(CommandConfig::Each {
        range: range("A2:C2"),
        var: "o".into(),
        items: "orders".into(),
    });
    orders
        .validations
        .push(ValidationRule::new("B2", "$value >= 0", Some("Quantity cannot be negative")));
    vec![customer, orders]
}

fn data() -> Value {
    json!({
        "customer": {"name": "Acme"},
        "orders": [
            {"item": "bolt", "qty": 4},
            {"item": "nut", "qty": 2},
            {"item": "gear", "qty": 1}
        ]
    })
}

fn open(data: Value) -> FormSession<RecordingNotifier> {
    FormSession::open(
        templates(),
        configs(),
        data,
        SessionSettings::with_client_id("order-form"),
        RecordingNotifier::new(),
    )
    .unwrap()
}

/// (row, col) -> (display, revision) of every cached cell
fn snapshot(session: &FormSession<RecordingNotifier>) -> Vec<((u32, u16), (String, u64))> {
    let mut all: Vec<_> = session
        .cache()
        .iter()
        .map(|(key, cell)| (key, (cell.display.clone(), cell.revision)))
        .collect();
    all.sort();
    all
}

#[test]
fn test_opens_on_first_tab() {
    let session = open(data());
    assert_eq!(session.tab_names().collect::<Vec<_>>(), vec!["Customer", "Orders"]);
    assert_eq!(session.active_tab(), "Customer");
    assert_eq!(session.cached_display_value(0, 1), "Acme");
    assert_eq!(session.workbook().worksheet(2).unwrap().name(), "Rates");
}

#[test]
fn test_validate_row_touches_only_that_row() {
    let mut session = open(data());
    session.activate_tab("Orders").unwrap();
    assert_eq!(session.visible_rows(), 1..3);

    let before = snapshot(&session);
    session.on_value_change(2, 1, "7").unwrap();
    assert!(session.validate_row(2, false));
    let after = snapshot(&session);

    let unchanged = |cells: &[((u32, u16), (String, u64))]| -> Vec<((u32, u16), (String, u64))> {
        cells.iter().filter(|((row, _), _)| *row != 2).cloned().collect()
    };
    assert_eq!(unchanged(&before), unchanged(&after));
    assert_eq!(session.cached_display_value(2, 1), "7");
    assert_eq!(session.cached_display_value(2, 2), "17.5");
}

#[test]
fn test_edit_recalculates_dependents() {
    let mut session = open(data());
    session.activate_tab("Orders").unwrap();
    session.set_page(1).unwrap();
    assert_eq!(session.visible_rows(), 3..5);

    let sheet = session.active_sheet().unwrap();
    assert_eq!(sheet.get_formula_at(4, 2), Some("=SUM(C2:C4)"));
    assert_eq!(session.cached_display_value(4, 2), "17.5");

    assert!(session.on_value_change(3, 1, "3").unwrap());
    assert_eq!(session.cached_display_value(3, 2), "7.5");
    assert_eq!(session.cached_display_value(4, 2), "22.5");
    assert_eq!(session.context().root()["orders"][2]["qty"], json!(3.0));
}

#[test]
fn test_computed_cells_reject_edits() {
    let mut session = open(data());
    session.activate_tab("orders").unwrap();
    assert!(matches!(session.on_value_change(1, 2, "1"), Err(Error::ReadOnlyCell(_))));
}

#[test]
fn test_first_invalid_tab_is_shown() {
    let mut session = open(json!({
        "customer": {"name": ""},
        "orders": [{"item": "bolt", "qty": 1}, {"item": "nut", "qty": 1}, {"item": "gear", "qty": -2}]
    }));
    session.activate_tab("Orders").unwrap();

    assert_eq!(session.find_first_invalid_tab(false).as_deref(), Some("Customer"));
    assert_eq!(session.active_tab(), "Customer");
    assert!(session.on_value_change(0, 1, "Globex").unwrap());

    assert!(!session.pre_validation(false));
    assert_eq!(session.active_tab(), "Orders");
    assert_eq!(session.page(), 1);
    assert_eq!(
        session.cache().get(3, 1).and_then(|c| c.message.clone()).as_deref(),
        Some("Quantity cannot be negative")
    );

    assert!(session.on_value_change(3, 1, "2").unwrap());
    session.activate_tab("Customer").unwrap();
    assert!(session.pre_validation(false));
    assert_eq!(session.active_tab(), "Customer");
}

#[test]
fn test_rerender_picks_up_saved_edits() {
    let mut session = open(data());
    session.activate_tab("Orders").unwrap();
    session.on_value_change(1, 0, "washer").unwrap();
    session.on_value_change(1, 1, "10").unwrap();

    session.rerender("Orders").unwrap();
    assert_eq!(session.active_tab(), "Orders");
    assert_eq!(session.cached_display_value(1, 0), "washer");
    assert_eq!(session.cached_display_value(1, 2), "25");
    assert!(matches!(session.rerender("Shipping"), Err(Error::UnknownTab(_))));
}

#[test]
fn test_recalc_all_refreshes_visible_cells() {
    let mut session = open(data());
    session.activate_tab("Orders").unwrap();
    let stats = session.recalc_all();
    assert_eq!(stats.formula_count, 4);
    assert_eq!(stats.cells_calculated, 4);
    assert_eq!(stats.errors, 0);
    assert_eq!(session.cached_display_value(1, 2), "10");
}

#[test]
fn test_open_rejects_bad_configuration() {
    let mut missing = configs();
    missing[1].sheet_name = "Nowhere".into();
    let result = FormSession::open(templates(), missing, data(), SessionSettings::default(), NoopNotifier);
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));

    let mut doubled = configs();
    doubled[1].sheet_name = "Customer".into();
    let result = FormSession::open(templates(), doubled, data(), SessionSettings::default(), NoopNotifier);
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));

    let result = FormSession::open(templates(), Vec::new(), data(), SessionSettings::default(), NoopNotifier);
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_open_from_annotations() {
    let mut wb = Workbook::with_sheet("Tasks").unwrap();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", "Task").unwrap();
    sheet.set_cell_value("A2", "${t.title}").unwrap();
    sheet
        .set_comment(
            "A1",
            CellComment::text_only(r#"fs:form(name="To do", headerLastCell="A1", lastCell="A2", maxRowsPerPage="1")"#),
        )
        .unwrap();
    sheet
        .set_comment(
            "A2",
            CellComment::text_only("fs:each(var=\"t\", items=\"tasks\")\nfs:validate(rule=\"LEN($value) > 2\", message=\"Too short\")"),
        )
        .unwrap();

    let mut session = FormSession::open_with_annotations(
        wb,
        json!({"tasks": [{"title": "sweep"}, {"title": "up"}]}),
        SessionSettings::default(),
        NoopNotifier,
    )
    .unwrap();

    assert_eq!(session.active_tab(), "To do");
    assert_eq!(session.page_count(), 2);
    assert_eq!(session.cached_display_value(0, 0), "Task");
    assert_eq!(session.find_first_invalid_tab(false).as_deref(), Some("To do"));
    assert_eq!(session.page(), 1);
    assert_eq!(session.cached_display_value(2, 0), "up");
}

#[test]
fn test_edits_land_in_their_own_collection() {
    let mut wb = Workbook::with_sheet("Pairs").unwrap();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", "${i.name}").unwrap();
    sheet.set_cell_value("A2", "${i.name}").unwrap();

    let mut config = SheetConfiguration::new("Pairs", "Pairs", range("A1:A2"));
    config.commands.push(CommandConfig::Each {
        range: range("A1"),
        var: "i".into(),
        items: "a".into(),
    });
    config.commands.push(CommandConfig::Each {
        range: range("A2"),
        var: "i".into(),
        items: "b".into(),
    });

    let mut session = FormSession::open(
        wb,
        vec![config],
        json!({"a": [{"name": "a0"}], "b": [{"name": "b0"}]}),
        SessionSettings::default(),
        NoopNotifier,
    )
    .unwrap();
    assert_eq!(session.cached_display_value(1, 0), "b0");

    session.on_value_change(0, 0, "first").unwrap();
    session.on_value_change(1, 0, "second").unwrap();
    assert_eq!(
        session.into_data(),
        json!({"a": [{"name": "first"}], "b": [{"name": "second"}]})
    );
}
