// Graph inspection
pub mod graph;

// Plan / apply / destroy
pub mod apply;
pub mod plan;

// State and variant management
pub mod state;
pub mod variants;
