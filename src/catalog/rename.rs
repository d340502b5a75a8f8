//! Two-pass, collision-free renaming of output sheets
use crate::catalog::report::DiagnosticKind;
use crate::catalog::report::RenameConflict;
use crate::catalog::report::Reporter;
use crate::catalog::split::OutputSheet;
use crate::catalog::CatalogError;
use crate::error::SplitterError;
use std::collections::HashMap;
use std::collections::HashSet;

/// One rename from a temporary name to a final name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameMove {
    pub temp_name: String,
    pub final_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenamePlan {
    pub moves: Vec<RenameMove>,
    pub conflicts: Vec<RenameConflict>,
}

impl RenamePlan {
    pub fn final_name(&self, temp_name: &str) -> Option<&str> {
        self.moves
            .iter()
            .find(|rename| rename.temp_name == temp_name)
            .map(|rename| rename.final_name.as_str())
    }
}

/// Sheet names are compared the way spreadsheet applications do: ignoring case, Unicode included.
fn key(name: &str) -> String {
    name.to_lowercase()
}

/// Plans renames against a registry of every live sheet name.
pub struct SafeRenamer {
    registry: HashSet<String>,
}

impl SafeRenamer {
    /// `reserved` are the names that stay in the workbook: the index sheet and untouched sheets.
    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        SafeRenamer {
            registry: reserved.into_iter().map(key).collect(),
        }
    }

    /// Pass one registers every temporary name; pass two moves each sheet to its FinalID,
    /// appending ` (n)` when the name is already live.
    pub fn plan(mut self, outputs: &[OutputSheet], reporter: &mut Reporter) -> RenamePlan {
        for output in outputs {
            self.registry.insert(key(&output.temp_name));
        }

        let mut plan = RenamePlan::default();
        for output in outputs {
            let wanted = output.final_id.to_string();
            let mut final_name = wanted.to_owned();
            let mut counter = 1usize;
            while self.registry.contains(&key(&final_name)) {
                final_name = format!("{wanted} ({counter})");
                counter += 1;
            }
            if final_name != wanted {
                reporter.record(
                    DiagnosticKind::RenameConflict,
                    &wanted,
                    format!("name already taken, sheet renamed to '{final_name}'"),
                );
                plan.conflicts.push(RenameConflict {
                    wanted,
                    assigned: final_name.to_owned(),
                });
            }
            self.registry.remove(&key(&output.temp_name));
            self.registry.insert(key(&final_name));
            plan.moves.push(RenameMove {
                temp_name: output.temp_name.to_owned(),
                final_name,
            });
        }
        plan
    }
}

/// Applies the plan to the output sheets, refusing any move that would duplicate a live name.
pub fn apply(plan: &RenamePlan, outputs: &mut [OutputSheet], reserved: &[&str]) -> Result<(), SplitterError> {
    let mut live: HashMap<String, String> = reserved.iter().map(|name| (key(name), name.to_string())).collect();
    for output in outputs.iter() {
        live.insert(key(&output.temp_name), output.temp_name.to_owned());
    }
    for rename in &plan.moves {
        live.remove(&key(&rename.temp_name));
        if live.insert(key(&rename.final_name), rename.final_name.to_owned()).is_some() {
            Err(CatalogError::DuplicateSheetName(rename.final_name.to_owned()))?;
        }
        if let Some(output) = outputs.iter_mut().find(|output| output.temp_name == rename.temp_name) {
            output.grid.name = rename.final_name.to_owned();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::index::FinalId;
    use crate::spreadsheet::sheet::SheetGrid;

    fn output(temp_name: &str, final_id: FinalId) -> OutputSheet {
        OutputSheet {
            temp_name: temp_name.to_owned(),
            final_id,
            entry_row: 0,
            source_sheet: None,
            grid: SheetGrid::from_rows(temp_name, vec![]),
        }
    }

    #[test]
    fn conflicts_get_a_counter_suffix() -> Result<(), SplitterError> {
        let mut outputs = vec![
            output("tmp_a", FinalId::Base(3)),
            output("tmp_b", FinalId::Sub(3, 1)),
            output("tmp_c", FinalId::Base(4)),
        ];
        let reserved = ["Index", "3", "3 (1)"];
        let mut reporter = Reporter::new();
        let plan = SafeRenamer::new(reserved).plan(&outputs, &mut reporter);
        assert_eq!(plan.final_name("tmp_a"), Some("3 (2)"));
        assert_eq!(plan.final_name("tmp_b"), Some("3_1"));
        assert_eq!(plan.final_name("tmp_c"), Some("4"));
        assert_eq!(plan.conflicts, vec![RenameConflict { wanted: "3".to_owned(), assigned: "3 (2)".to_owned() }]);
        assert_eq!(reporter.count(DiagnosticKind::RenameConflict), 1);

        apply(&plan, &mut outputs, &reserved)?;
        let names: Vec<&str> = outputs.iter().map(|output| output.grid.name.as_str()).collect();
        assert_eq!(names, vec!["3 (2)", "3_1", "4"]);
        Ok(())
    }

    #[test]
    fn replaced_source_names_are_free() {
        // A processed source sheet "8" is not reserved, so its outputs may take the name back
        let outputs = vec![output("tmp_a", FinalId::Base(8)), output("tmp_b", FinalId::Sub(8, 1))];
        let plan = SafeRenamer::new(["Index", "9"]).plan(&outputs, &mut Reporter::new());
        assert!(plan.conflicts.is_empty());
        assert_eq!(plan.final_name("tmp_a"), Some("8"));
    }

    #[test]
    fn apply_rejects_duplicates() {
        let mut outputs = vec![output("tmp_a", FinalId::Base(1))];
        let plan = RenamePlan {
            moves: vec![RenameMove { temp_name: "tmp_a".to_owned(), final_name: "index".to_owned() }],
            conflicts: vec![],
        };
        assert!(apply(&plan, &mut outputs, &["Index"]).is_err());

        // Case folding is not limited to ASCII
        let plan = RenamePlan {
            moves: vec![RenameMove { temp_name: "tmp_a".to_owned(), final_name: "übersicht".to_owned() }],
            conflicts: vec![],
        };
        assert!(apply(&plan, &mut outputs, &["ÜBERSICHT"]).is_err());
    }
}
