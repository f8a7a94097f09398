mod headers;
mod id;

pub use headers::{header_list_from_map, header_list_to_map, is_hop_by_hop};
pub use id::generate_call_id;
