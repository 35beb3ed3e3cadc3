//! Resolution and merge engine.

mod consistency;
mod matcher;
mod merger;

pub use consistency::{ConsistencyEnforcer, FinalizeStats};
pub use matcher::{
    cosine_similarity, find_match, match_item, process_lists, union_entities_by_id_and_label,
    union_relationships_by_name, MatchOutcome, Matchable,
};
pub use merger::{merge_by_canonical_id, merge_relationships_sharing_endpoints, RepresentativePolicy};
