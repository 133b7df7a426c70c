pub mod entity;

pub use entity::{
    DESCRIPTION_COLUMN, NAME_COLUMN, SPATIAL_ANCHOR_ID_COLUMN, THUMBNAIL_BLOB_NAME_COLUMN,
    VISION_STATE_COLUMN, decode, decode_vision_state, encode, encode_vision_state,
};
