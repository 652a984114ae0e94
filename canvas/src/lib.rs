//! History and replay engine for a layered raster editor.
//!
//! The crate owns the editor's document model and everything that makes it
//! reproducible: a committed undo/redo history built from patches, a
//! temporary history for live interactive operations, a journal of every
//! document operation, and a replayer that rebuilds a document from that
//! journal. Rendering chrome and platform input are the host's job; the
//! engine takes pointer and key events and exposes plain state.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Top-level [`engine::Engine`] and testable [`engine::EngineCore`] |
//! | [`layers`] | Layer panel operations on the active layer |
//! | [`document`] | Journaled document operations and their parameters |
//! | [`doc`] | Layers, composed snapshots and history patches |
//! | [`history`] | Committed undo/redo history store |
//! | [`temp_history`] | Undo steps of a live, uncommitted operation |
//! | [`executor`] | Routes undo/redo between the two histories |
//! | [`chain`] | Pointer sample pipeline for brush strokes |
//! | [`sanitizer`] | Drops malformed sample sequences |
//! | [`smoothing`] | Stroke smoothing stage |
//! | [`chain_recorder`] | Captures raw strokes as `draw` records |
//! | [`brush`] | Brushes and their configuration |
//! | [`raster`] | Pixel operations |
//! | [`selection`] | Selections, masks and affine matrices |
//! | [`select`] | Selection transform sessions |
//! | [`recorder`] | Journal writer with ordered, retried appends |
//! | [`storage`] | Memory and file journal providers |
//! | [`replay`] | Tag-keyed replay handler registry |
//! | [`input`] | Tools, modifiers and the shortcut table |
//! | [`tools`] | Shape, gradient, fill and text settings |
//! | [`ui`] | UI state, notifications and the modal counter |
//! | [`viewport`] | Pan/zoom and coordinate conversions |
//! | [`config`] | Engine tuning, with environment overrides |
//! | [`consts`] | Shared numeric limits and defaults |

pub mod brush;
pub mod chain;
pub mod chain_recorder;
pub mod config;
pub mod consts;
pub mod doc;
pub mod document;
pub mod engine;
pub mod executor;
pub mod history;
pub mod input;
pub mod layers;
pub mod raster;
pub mod recorder;
pub mod replay;
pub mod sanitizer;
pub mod select;
pub mod selection;
pub mod smoothing;
pub mod storage;
pub mod temp_history;
pub mod tools;
pub mod ui;
pub mod viewport;
