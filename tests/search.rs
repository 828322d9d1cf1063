use thinslice_catalog::domain::SpecimenRecord;
use thinslice_catalog::search::{Debouncer, filter, rock_type_categories, tag_suggestions};

fn record(id: &str, name: &str, rock_type: &str) -> SpecimenRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": name,
        "rock_type": rock_type,
    }))
    .unwrap()
}

fn sample() -> Vec<SpecimenRecord> {
    vec![
        record("1", "Bakken Shale", "Shale"),
        record("2", "Permian Sandstone", "Sandstone"),
    ]
}

fn names(records: &[&SpecimenRecord]) -> Vec<String> {
    records.iter().map(|record| record.name.clone()).collect()
}

#[test]
fn query_matches_name() {
    let records = sample();
    assert_eq!(names(&filter(&records, "bakken", "all")), vec!["Bakken Shale"]);
}

#[test]
fn category_matches_rock_type() {
    let records = sample();
    assert_eq!(
        names(&filter(&records, "", "Sandstone")),
        vec!["Permian Sandstone"]
    );
}

#[test]
fn empty_query_keeps_everything_in_order() {
    let records = sample();
    assert_eq!(
        names(&filter(&records, "", "all")),
        vec!["Bakken Shale", "Permian Sandstone"]
    );
}

#[test]
fn query_covers_formation_location_and_minerals() {
    let mut records = sample();
    records[0].formation = "Williston Basin".to_string();
    records[1].location = "Midland, Texas".to_string();
    records[1].minerals = vec!["Quartz".to_string(), "K-Feldspar".to_string()];

    assert_eq!(names(&filter(&records, "WILLISTON", "all")), vec!["Bakken Shale"]);
    assert_eq!(names(&filter(&records, "texas", "all")), vec!["Permian Sandstone"]);
    assert_eq!(
        names(&filter(&records, "quartz k-feld", "all")),
        vec!["Permian Sandstone"]
    );
    assert!(filter(&records, "granite", "all").is_empty());
}

#[test]
fn category_is_a_case_insensitive_fragment() {
    let records = vec![
        record("1", "A", "Shale"),
        record("2", "B", "Sandstone - Arkosic"),
        record("3", "C", "Limestone"),
    ];
    assert_eq!(names(&filter(&records, "", "stone")), vec!["B", "C"]);
    assert_eq!(names(&filter(&records, "", "SHALE")), vec!["A"]);
}

#[test]
fn only_lowercase_all_selects_every_category() {
    let records = vec![
        record("1", "A", "Shale"),
        record("2", "B", "Metallic Ore"),
    ];
    assert_eq!(names(&filter(&records, "", "all")), vec!["A", "B"]);
    assert_eq!(names(&filter(&records, "", "ALL")), vec!["B"]);
    assert_eq!(names(&filter(&records, "", "All")), vec!["B"]);
}

#[test]
fn categories_use_primary_rock_type() {
    let records = vec![
        record("1", "A", "Sandstone - Arkosic"),
        record("2", "B", "Shale"),
        record("3", "C", "Sandstone"),
        record("4", "D", "Basalt-Vesicular"),
    ];
    assert_eq!(
        rock_type_categories(&records),
        vec!["Basalt", "Sandstone", "Shale"]
    );
}

#[test]
fn tag_suggestions_take_five_per_record() {
    let mut records = sample();
    records[0].tags = ["a", "b", "c", "d", "e", "f"].map(String::from).to_vec();
    records[1].tags = ["c", "g"].map(String::from).to_vec();
    assert_eq!(
        tag_suggestions(&records),
        vec!["a", "b", "c", "d", "e", "g"]
    );
}

#[test]
fn debouncer_releases_latest_input_after_quiet_period() {
    let mut debouncer = Debouncer::new(400);
    debouncer.push(1_000, "sand".to_string());
    assert_eq!(debouncer.poll(1_300), None);
    debouncer.push(1_300, "sandstone".to_string());
    assert_eq!(debouncer.poll(1_600), None);
    assert_eq!(debouncer.poll(1_700), Some("sandstone".to_string()));
    assert!(!debouncer.is_pending());
}
