// Facet filters - cascading narrowing of the library by tag values
// Nodes are plain data in a store; the controller is the only thing that mutates them

pub mod column;     // column definitions + field expressions
pub mod controller; // cascade engine and event dispatch
pub mod error;
pub mod group;      // ordered filter chains
pub mod intersect;
pub mod node;       // single filter state
pub mod search;     // search predicate + async executor
pub mod store;      // arena of nodes and groups

pub use column::{Facet, FilterColumn, FilterColumnRegistry, UNKNOWN_VALUE};
pub use controller::{FilterController, FilterEvent};
pub use error::{FilterError, Result};
pub use group::FilterGroup;
pub use intersect::track_intersection;
pub use node::{FacetRow, FilterNode, GroupId, NodeId};
pub use search::{SearchExecutor, SearchMode, SearchOutcome, SearchResult};
pub use store::FilterStore;
