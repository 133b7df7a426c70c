//! Record <-> row column mapping.
//!
//! Rows hold only primitive columns. Scalar record fields map to one text
//! column each; the embedded [`VisionState`] is stored as canonical JSON
//! under the reserved [`VISION_STATE_COLUMN`].
//!
//! Canonical form: `serde_json` compact output with fields in declaration
//! order followed by preserved unknown sub-fields in key order. Encoding a
//! decoded value therefore reproduces the original column byte-for-byte.

use crate::core::{Columns, RegistryError, Result, Value};
use crate::domain::{TrackedObjectRecord, VisionState};

// Column names are part of the persisted layout. Renaming any of them
// requires migrating existing rows.
pub const NAME_COLUMN: &str = "Name";
pub const DESCRIPTION_COLUMN: &str = "Description";
pub const THUMBNAIL_BLOB_NAME_COLUMN: &str = "ThumbnailBlobName";
pub const SPATIAL_ANCHOR_ID_COLUMN: &str = "SpatialAnchorId";
pub const VISION_STATE_COLUMN: &str = "VisionState";

pub fn encode(record: &TrackedObjectRecord) -> Result<Columns> {
    record.validate()?;

    let mut columns = Columns::new();
    columns.insert(NAME_COLUMN.to_string(), Value::from(record.name.as_str()));
    if let Some(description) = &record.description {
        columns.insert(
            DESCRIPTION_COLUMN.to_string(),
            Value::from(description.as_str()),
        );
    }
    columns.insert(
        THUMBNAIL_BLOB_NAME_COLUMN.to_string(),
        Value::from(record.thumbnail_blob_name.as_str()),
    );
    columns.insert(
        SPATIAL_ANCHOR_ID_COLUMN.to_string(),
        Value::from(record.spatial_anchor_id.as_str()),
    );
    columns.insert(
        VISION_STATE_COLUMN.to_string(),
        Value::Text(encode_vision_state(&record.vision_state)?),
    );
    Ok(columns)
}

pub fn decode(columns: &Columns) -> Result<TrackedObjectRecord> {
    let name = match columns.get(NAME_COLUMN) {
        Some(value) => text_column(NAME_COLUMN, value, "<unnamed>")?.to_string(),
        None => {
            return Err(RegistryError::corrupt(
                "<unnamed>",
                format!("missing '{}' column", NAME_COLUMN),
            ));
        }
    };

    let description = columns
        .get(DESCRIPTION_COLUMN)
        .map(|value| text_column(DESCRIPTION_COLUMN, value, &name).map(str::to_string))
        .transpose()?;
    let thumbnail_blob_name = optional_text(columns, THUMBNAIL_BLOB_NAME_COLUMN, &name)?;
    let spatial_anchor_id = optional_text(columns, SPATIAL_ANCHOR_ID_COLUMN, &name)?;

    // Rows written before vision tracking existed have no payload column.
    let vision_state = match columns.get(VISION_STATE_COLUMN) {
        Some(value) => {
            let payload = text_column(VISION_STATE_COLUMN, value, &name)?;
            decode_vision_state(payload)
                .map_err(|reason| RegistryError::corrupt(name.as_str(), reason))?
        }
        None => VisionState::default(),
    };

    let record = TrackedObjectRecord {
        name,
        description,
        thumbnail_blob_name,
        spatial_anchor_id,
        vision_state,
    };
    record
        .validate()
        .map_err(|err| RegistryError::corrupt(record.name.as_str(), err.to_string()))?;
    Ok(record)
}

pub fn encode_vision_state(state: &VisionState) -> Result<String> {
    state.validate()?;
    serde_json::to_string(state).map_err(|e| {
        RegistryError::validation(format!("Failed to serialize vision state: {}", e))
    })
}

/// Parses a stored payload. The error string becomes the corrupt-row reason.
pub fn decode_vision_state(payload: &str) -> std::result::Result<VisionState, String> {
    serde_json::from_str(payload)
        .map_err(|e| format!("'{}' column is not a valid payload: {}", VISION_STATE_COLUMN, e))
}

fn text_column<'a>(column: &str, value: &'a Value, row_key: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        RegistryError::corrupt(
            row_key,
            format!("column '{}' expects TEXT, got {}", column, value.type_name()),
        )
    })
}

fn optional_text(columns: &Columns, column: &str, row_key: &str) -> Result<String> {
    match columns.get(column) {
        Some(value) => Ok(text_column(column, value, row_key)?.to_string()),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mug() -> TrackedObjectRecord {
        TrackedObjectRecord::new("Mug")
            .unwrap()
            .with_description("blue coffee mug")
            .with_thumbnail_blob_name("mug.png")
            .with_spatial_anchor_id("anchor-42")
            .with_vision_state(
                VisionState::new("proj-1")
                    .with_iteration("it-3", "mug-v3")
                    .with_tag("mug", "t1")
                    .with_images(["i1", "i2"]),
            )
    }

    #[test]
    fn encode_writes_one_column_per_scalar_plus_payload() {
        let columns = encode(&mug()).unwrap();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[NAME_COLUMN], Value::from("Mug"));
        assert_eq!(columns[THUMBNAIL_BLOB_NAME_COLUMN], Value::from("mug.png"));
        let payload = columns[VISION_STATE_COLUMN].as_str().unwrap();
        assert!(payload.starts_with("{\"ProjectId\":\"proj-1\""));
    }

    #[test]
    fn description_column_is_omitted_when_absent() {
        let record = TrackedObjectRecord::new("Plant").unwrap();
        let columns = encode(&record).unwrap();
        assert!(!columns.contains_key(DESCRIPTION_COLUMN));
        assert_eq!(decode(&columns).unwrap(), record);
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let record = mug();
        assert_eq!(decode(&encode(&record).unwrap()).unwrap(), record);
    }

    #[test]
    fn round_trip_of_all_empty_vision_state() {
        let record = TrackedObjectRecord::new("Empty")
            .unwrap()
            .with_vision_state(VisionState::default());
        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert!(decoded.vision_state.image_ids.is_empty());
        assert_eq!(decoded, record);
    }

    #[test]
    fn encoding_is_canonical() {
        let first = encode(&mug()).unwrap();
        let second = encode(&decode(&first).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_payload_column_decodes_to_default_state() {
        let mut columns = encode(&mug()).unwrap();
        columns.remove(VISION_STATE_COLUMN);
        let record = decode(&columns).unwrap();
        assert_eq!(record.vision_state, VisionState::default());
        assert_eq!(record.thumbnail_blob_name, "mug.png");
    }

    #[test]
    fn unparsable_payload_is_corrupt_not_defaulted() {
        let mut columns = encode(&mug()).unwrap();
        columns.insert(VISION_STATE_COLUMN.to_string(), Value::from("{not json"));
        let err = decode(&columns).unwrap_err();
        assert!(matches!(err, RegistryError::CorruptPayload { ref row_key, .. } if row_key == "Mug"));
    }

    #[test]
    fn wrongly_shaped_payload_is_corrupt() {
        let mut columns = encode(&mug()).unwrap();
        columns.insert(
            VISION_STATE_COLUMN.to_string(),
            Value::from(r#"{"ImageIds":"i1"}"#),
        );
        assert!(decode(&columns).unwrap_err().is_corrupt_payload());

        columns.insert(VISION_STATE_COLUMN.to_string(), Value::from("[]"));
        assert!(decode(&columns).unwrap_err().is_corrupt_payload());
    }

    #[test]
    fn non_text_payload_column_is_corrupt() {
        let mut columns = encode(&mug()).unwrap();
        columns.insert(VISION_STATE_COLUMN.to_string(), Value::Integer(7));
        assert!(decode(&columns).unwrap_err().is_corrupt_payload());
    }

    #[test]
    fn missing_or_blank_name_is_corrupt() {
        let mut columns = encode(&mug()).unwrap();
        columns.remove(NAME_COLUMN);
        assert!(decode(&columns).unwrap_err().is_corrupt_payload());

        columns.insert(NAME_COLUMN.to_string(), Value::from("  "));
        assert!(decode(&columns).unwrap_err().is_corrupt_payload());
    }

    #[test]
    fn unknown_sub_fields_survive_a_round_trip() {
        let mut columns = encode(&mug()).unwrap();
        columns.insert(
            VISION_STATE_COLUMN.to_string(),
            Value::from(r#"{"TagName":"mug","Confidence":0.93,"ImageIds":["i1"]}"#),
        );
        let record = decode(&columns).unwrap();
        assert_eq!(record.vision_state.tag_name, "mug");
        assert_eq!(
            record.vision_state.extensions.get("Confidence"),
            Some(&serde_json::json!(0.93))
        );

        let reencoded = encode(&record).unwrap();
        let payload = reencoded[VISION_STATE_COLUMN].as_str().unwrap();
        assert!(payload.contains("\"Confidence\":0.93"));
    }

    #[test]
    fn partial_payload_fills_missing_sub_fields_with_defaults() {
        let state = decode_vision_state(r#"{"TagId":"t9"}"#).unwrap();
        assert_eq!(state.tag_id, "t9");
        assert!(state.project_id.is_empty());
        assert!(state.image_ids.is_empty());
    }
}
