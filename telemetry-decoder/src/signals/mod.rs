//! Signal layout definitions and the DBC parser
//!
//! This module contains the frame layout data model, its JSON document form,
//! and the parser that loads layouts from DBC files.

pub mod dbc;
pub mod layout;

// Re-export key types for convenience
pub use layout::{Endianness, FrameLayout, LayoutDocument, SignalField, ValueTable};
