pub mod ids;
pub mod validation;

pub use ids::{
    decode_target, encode_target, generate_opaque_id, is_http_url, is_well_formed_id,
    resource_id_from_target, short_id, REQUEST_ID_BYTES, TOKEN_BYTES,
};
pub use validation::ValidatedJson;
