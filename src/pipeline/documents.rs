use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::docx::parts::overwrite_data_part;
use crate::docx::{fill_bound_fields, ContentParts, DocxPackage};
use crate::progress::ConsoleProgress;
use crate::template::DataDocument;

use super::naming::{LoadedFile, OutputNaming};

#[derive(Clone, Debug)]
pub struct FilledDocument {
    pub template: PathBuf,
    pub output: PathBuf,
    pub fields: usize,
}

#[derive(Clone, Debug)]
pub struct FillReport {
    pub output_dir: PathBuf,
    pub filled: Vec<FilledDocument>,
    pub failures: Vec<(PathBuf, String)>,
}

impl FillReport {
    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        let status = if self.has_errors() {
            "finished with errors"
        } else {
            "finished"
        };
        format!(
            "document generation {status}: {} generated, {} failed; output: {}",
            self.filled.len(),
            self.failures.len(),
            self.output_dir.display()
        )
    }
}

/// Produces finished documents from bound templates and one filled data sheet.
pub struct DocumentGenerator<'a> {
    pub naming: &'a OutputNaming,
    pub progress: &'a ConsoleProgress,
}

impl DocumentGenerator<'_> {
    pub fn generate(
        &self,
        templates: &[LoadedFile],
        sheet: &Path,
        out_dir: &Path,
    ) -> anyhow::Result<FillReport> {
        let data = DataDocument::load(sheet)?;
        let data_bytes = std::fs::read(sheet)
            .with_context(|| format!("read data sheet: {}", sheet.display()))?;
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("create output dir: {}", out_dir.display()))?;

        let mut report = FillReport {
            output_dir: out_dir.to_path_buf(),
            filled: Vec::new(),
            failures: Vec::new(),
        };
        for (i, file) in templates.iter().enumerate() {
            self.progress.progress("documents", i + 1, templates.len());
            let output = out_dir.join(self.naming.file_name(&file.output_stem(), "docx"));
            match fill_one(&file.path, &output, &data, &data_bytes) {
                Ok(fields) => {
                    self.progress.info(format!(
                        "{} -> {} ({fields} field(s))",
                        file.path.display(),
                        output.display()
                    ));
                    report.filled.push(FilledDocument {
                        template: file.path.clone(),
                        output,
                        fields,
                    });
                }
                Err(e) => {
                    self.progress
                        .warn(format!("{} failed: {e:#}", file.path.display()));
                    report.failures.push((file.path.clone(), format!("{e:#}")));
                }
            }
        }
        Ok(report)
    }
}

/// Fills one template into `output` and returns the number of fields written.
pub fn fill_one(template: &Path, output: &Path, data: &DataDocument, data_bytes: &[u8]) -> anyhow::Result<usize> {
    let mut pkg = DocxPackage::read(template)?;
    let parts = ContentParts::discover(&pkg)?;
    overwrite_data_part(&mut pkg, &parts.main, data_bytes.to_vec())
        .with_context(|| format!("update data part: {}", template.display()))?;

    let mut fields = 0;
    for name in parts.all() {
        let mut doc = pkg.read_xml(name)?;
        fields += fill_bound_fields(&mut doc.root, data);
        pkg.write_xml(&doc)?;
    }
    pkg.write(output)?;
    Ok(fields)
}
