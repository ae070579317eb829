//! Control file generation for a tree/alignment pair.

use crate::model::{ControlFile, ModelId};
use crate::ControlFileError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// A control file and where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedControl {
    pub path: PathBuf,
    pub control: ControlFile,
}

impl GeneratedControl {
    pub fn model(&self) -> ModelId {
        self.control.descriptor.model
    }
}

/// The requested models, each followed by its partners when
/// `generate_other` is set. Duplicates are dropped, first occurrence wins.
pub fn expand_models(models: &[ModelId], generate_other: bool) -> Vec<ModelId> {
    let mut expanded = Vec::new();
    for &model in models {
        let partners: &[ModelId] = if generate_other {
            model.partners()
        } else {
            &[]
        };
        for &m in std::iter::once(&model).chain(partners) {
            if !expanded.contains(&m) {
                expanded.push(m);
            }
        }
    }
    expanded
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
        .into_owned()
}

/// Control files for `model` (and its partners with `generate_other`).
///
/// Each descriptor yields `<prefix><suffix>.ctl` whose result file is
/// `<prefix name><suffix>`; `prefix` defaults to the tree path.
pub fn control_files(
    model: ModelId,
    tree: &Path,
    alignment: &Path,
    prefix: Option<&Path>,
    generate_other: bool,
) -> Vec<GeneratedControl> {
    let prefix = prefix.unwrap_or(tree);
    expand_models(&[model], generate_other)
        .into_iter()
        .flat_map(|m| m.descriptors().iter())
        .map(|descriptor| {
            let mut path = OsString::from(prefix.as_os_str());
            path.push(format!("{}.ctl", descriptor.suffix));
            GeneratedControl {
                path: PathBuf::from(path),
                control: ControlFile {
                    seqfile: file_name(alignment),
                    treefile: file_name(tree),
                    outfile: format!("{}{}", file_name(prefix), descriptor.suffix),
                    descriptor: *descriptor,
                },
            }
        })
        .collect()
}

/// Control files of `models` for one unit. Models needing a foreground
/// branch get one set per labeled tree, the others a single set on the
/// unlabeled tree.
pub fn controls_for_trees(
    models: &[ModelId],
    generate_other: bool,
    labeled: &[PathBuf],
    unlabeled: &Path,
    alignment: &Path,
) -> Vec<GeneratedControl> {
    let mut controls = Vec::new();
    for model in expand_models(models, generate_other) {
        let trees: Vec<&Path> = if model.needs_foreground() {
            labeled.iter().map(PathBuf::as_path).collect()
        } else {
            vec![unlabeled]
        };
        for tree in trees {
            controls.extend(control_files(model, tree, alignment, None, false));
        }
    }
    controls
}

/// Write the control files to disk.
pub fn write_control_files(controls: &[GeneratedControl]) -> Result<Vec<PathBuf>, ControlFileError> {
    controls
        .iter()
        .map(|c| -> Result<PathBuf, ControlFileError> {
            std::fs::write(&c.path, c.control.to_string()).map_err(|source| ControlFileError {
                path: c.path.clone(),
                source,
            })?;
            Ok(c.path.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_models() {
        use ModelId::*;
        assert_eq!(expand_models(&[AH1, AH0], false), vec![AH1, AH0]);
        assert_eq!(expand_models(&[AH1], true), vec![AH1, AH0]);
        assert_eq!(expand_models(&[M8], true), vec![M8, M7, M8A]);
        assert_eq!(expand_models(&[M7, M8], true), vec![M7, M8, M8A]);
        assert_eq!(expand_models(&[M0, BM], true), vec![M0, BM]);
    }

    #[test]
    fn test_control_files_naming() {
        let tree = Path::new("/run/OG1/OG1.nwk.5");
        let aln = Path::new("/run/OG1/OG1.paml");
        let controls = control_files(ModelId::M7, tree, aln, None, true);
        let summary: Vec<_> = controls
            .iter()
            .map(|c| (c.path.to_string_lossy().into_owned(), c.control.outfile.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    "/run/OG1/OG1.nwk.5.M7_e1.ctl".to_string(),
                    "OG1.nwk.5.M7_e1".to_string()
                ),
                (
                    "/run/OG1/OG1.nwk.5.M8_e1.ctl".to_string(),
                    "OG1.nwk.5.M8_e1".to_string()
                ),
            ]
        );
        assert_eq!(controls[0].control.seqfile, "OG1.paml");
        assert_eq!(controls[0].control.treefile, "OG1.nwk.5");
        assert_eq!(control_files(ModelId::M0, tree, aln, None, false).len(), 3);

        let prefix = Path::new("/out/custom");
        let ah0 = control_files(ModelId::AH0, tree, aln, Some(prefix), false);
        assert_eq!(ah0[0].path, PathBuf::from("/out/custom.Ah0.ctl"));
        assert_eq!(ah0[0].control.outfile, "custom.Ah0");
    }

    #[test]
    fn test_controls_for_trees() {
        let labeled = vec![PathBuf::from("OG1.nwk.5"), PathBuf::from("OG1.nwk.4")];
        let controls = controls_for_trees(
            &[ModelId::AH1, ModelId::M7],
            true,
            &labeled,
            Path::new("OG1.nwk.nl"),
            Path::new("OG1.paml"),
        );
        let outfiles: Vec<_> = controls.iter().map(|c| c.control.outfile.as_str()).collect();
        assert_eq!(
            outfiles,
            vec![
                "OG1.nwk.5.Ah1",
                "OG1.nwk.4.Ah1",
                "OG1.nwk.5.Ah0",
                "OG1.nwk.4.Ah0",
                "OG1.nwk.nl.M7_e1",
                "OG1.nwk.nl.M8_e1",
            ]
        );
        assert!(controls_for_trees(&[ModelId::BM], false, &[], Path::new("t.nl"), Path::new("a")).is_empty());
    }

    #[test]
    fn test_write_control_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let tree = dir.path().join("OG1.nwk.nl");
        let aln = dir.path().join("OG1.paml");
        let controls = control_files(ModelId::BM, &tree, &aln, None, false);
        let written = write_control_files(&controls)?;
        assert_eq!(
            written,
            vec![
                dir.path().join("OG1.nwk.nl.BM_f1.ctl"),
                dir.path().join("OG1.nwk.nl.BM_e1.ctl")
            ]
        );
        let text = std::fs::read_to_string(&written[0])?;
        assert!(text.contains("outfile = OG1.nwk.nl.BM_f1\n"));
        assert!(text.contains("fix_omega = 1\n"));
        Ok(())
    }
}
