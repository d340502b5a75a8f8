//! # Sheet Catalog
//!
//! Normalizes xlsx workbooks whose `Index` sheet catalogs the tables of the workbook into a
//! one-table-per-sheet layout with stable, collision-free sheet names.
//!
//! ## Features
//!
//! - **Canonical ids**: index rows are grouped by (Section, Table Title); the first occurrence of a
//!   group gets a dense base id, repeats get `{base}_{n}`
//! - **Block detection**: stacked tables inside one worksheet are found from their metadata markers
//!   (`Table Title:`, `Source(s):`, …), unit-indicator headers and period headers
//! - **Reconciliation**: detected blocks are matched with the index rows pointing at the sheet;
//!   every discrepancy is resolved and reported
//! - **Safe renaming**: output sheets go through temporary names before taking their final names
//! - **Link repair**: the index, back-links and links in untouched sheets point at the new sheets
//! - **Atomic writes**: the original workbook is replaced only once the new one is fully written
//!
//! ## Modes
//!
//! - `analyze`: report the plan for one workbook without writing
//! - `single-file`: process one workbook
//! - `batch`: process every workbook of a directory in parallel

pub mod batch;
pub mod catalog;
pub mod error;
pub mod helpers;
pub mod settings;
pub mod spreadsheet;
