//! Shared test data: a consistent reference registry and a submission that
//! validates cleanly against it.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::SubmissionRecord;
use crate::parser::{parse_extcsv, ExtCsv};
use crate::registry::{InMemoryRegistry, RegistryClient};

pub const PREFIX: &str = "woudc_data_registry";

pub const INSTRUMENT_ID: &str = "Brewer:MKII:014:TotalOzone:077:MSC:WOUDC";

/// A TotalOzone daily file from Churchill that matches the registry.
pub const VALID_FILE: &str = "\
* WOUDC Extended CSV
#CONTENT
Class,Category,Level,Form
WOUDC,TotalOzone,1.0,1

#DATA_GENERATION
Date,Agency,Version,ScientificAuthority
2023-02-01,MSC,1.0,Jane Doe

#PLATFORM
Type,ID,Name,Country,GAW_ID
STN,077,Churchill,CAN,

#INSTRUMENT
Name,Model,Number
Brewer,MKII,014

#LOCATION
Latitude,Longitude,Height
58.74,-94.07,35

#TIMESTAMP
UTCOffset,Date,Time
+00:00:00,2023-01-01,00:00:00

#DAILY
Date,WLCode,ObsCode,ColumnO3
2023-01-01,9,DS,350
2023-01-02,9,DS,352
";

fn props(properties: Value) -> Value {
    json!({ "properties": properties })
}

/// In-memory registry seeded with the reference documents.
pub fn backend() -> InMemoryRegistry {
    let index = |collection: &str| format!("{}.{}", PREFIX, collection);
    InMemoryRegistry::new()
        .with_documents(
            &index("project"),
            vec![props(json!({ "identifier": "WOUDC" })), props(json!({ "identifier": "GAW" }))],
        )
        .with_documents(
            &index("dataset"),
            vec![
                props(json!({ "identifier": "TotalOzone" })),
                props(json!({ "identifier": "OzoneSonde" })),
            ],
        )
        .with_documents(
            &index("discovery_metadata"),
            vec![
                props(json!({ "identifier": "TotalOzone", "levels": [
                    { "label_en": "Level 1.0" }, { "label_en": "Level 2.0" }
                ] })),
                props(json!({ "identifier": "UmkehrN14_1.0", "levels": [{ "label_en": "Level 1.0" }] })),
                props(json!({ "identifier": "UmkehrN14_2.0", "levels": [{ "label_en": "Level 2.0" }] })),
            ],
        )
        .with_documents(
            &index("contributor"),
            vec![props(json!({ "project": "WOUDC", "acronym": "MSC" }))],
        )
        .with_documents(
            &index("station"),
            vec![
                props(json!({ "woudc_id": "077", "type": "STN", "name": "Churchill", "country_name_en": "Canada" })),
                props(json!({ "woudc_id": "401", "type": "SHP", "name": "Polarstern", "country_name_en": "International Waters" })),
            ],
        )
        .with_documents(
            &index("country"),
            vec![
                props(json!({ "identifier": "CAN", "country_name_en": "Canada" })),
                props(json!({ "identifier": "XY", "country_name_en": "International Waters" })),
            ],
        )
        .with_documents(
            &index("deployment"),
            vec![
                props(json!({ "identifier": "077:MSC:WOUDC" })),
                props(json!({ "identifier": "401:MSC:WOUDC" })),
            ],
        )
        .with_documents(
            &index("instrument"),
            vec![
                json!({
                    "id": INSTRUMENT_ID,
                    "properties": { "identifier": INSTRUMENT_ID, "name": "Brewer", "model": "MKII" },
                    "geometry": { "type": "Point", "coordinates": [-94.07, 58.74, 35.0] }
                }),
                json!({
                    "properties": { "identifier": "Dobson:Beck:101:TotalOzone:401:MSC:WOUDC", "name": "Dobson", "model": "Beck" },
                    "geometry": { "type": "Point", "coordinates": [null, null, null] }
                }),
            ],
        )
}

pub fn registry() -> RegistryClient {
    RegistryClient::new(Arc::new(backend()), PREFIX)
}

pub fn valid_extcsv() -> ExtCsv {
    parse_extcsv(VALID_FILE).expect("fixture parses")
}

pub fn valid_record() -> SubmissionRecord {
    SubmissionRecord::from_extcsv(&valid_extcsv()).expect("fixture has all metadata")
}

/// Replace the first occurrence of `from` in the valid file.
pub fn edited_file(from: &str, to: &str) -> String {
    assert!(VALID_FILE.contains(from), "fixture does not contain {:?}", from);
    VALID_FILE.replacen(from, to, 1)
}

