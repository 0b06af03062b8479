use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;

use crate::docx::parts::replace_data_part;
use crate::docx::tree::XmlDocument;
use crate::docx::{ContentControlBinder, ContentParts, DocxPackage};
use crate::progress::ConsoleProgress;
use crate::store::KeyStore;
use crate::template::{build_data_document, build_tag_map, scan_tags};

use super::merge::merge_data_sheets;
use super::naming::{stamp, LoadedFile, OutputNaming};

/// Last step a file reached while being turned into a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Loaded,
    Scanned,
    DataDocumentBuilt,
    ContentControlsBound,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "loaded",
            Self::Scanned => "scanned",
            Self::DataDocumentBuilt => "data document built",
            Self::ContentControlsBound => "content controls bound",
            Self::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub struct FileFailure {
    pub file: PathBuf,
    /// Last stage completed before the error; `None` when the file never loaded.
    pub stage: Option<Stage>,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct GeneratedTemplate {
    pub source: PathBuf,
    pub template: PathBuf,
    pub sheet: PathBuf,
    pub tags: usize,
    pub fields: usize,
}

#[derive(Clone, Debug)]
pub struct GenerationReport {
    pub output_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub sheets_dir: PathBuf,
    pub generated: Vec<GeneratedTemplate>,
    pub failures: Vec<FileFailure>,
    pub warnings: Vec<String>,
    pub merged_sheet: Option<PathBuf>,
    pub merge_error: Option<String>,
}

impl GenerationReport {
    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty() || self.merge_error.is_some()
    }

    pub fn summary(&self) -> String {
        let status = if self.has_errors() {
            "finished with errors"
        } else {
            "finished"
        };
        format!(
            "template generation {status}: {} generated, {} failed; output: {}",
            self.generated.len(),
            self.failures.len(),
            self.output_dir.display()
        )
    }
}

/// Turns `{tag}` documents into bound templates plus empty data sheets.
pub struct TemplateGenerator<'a> {
    pub template_naming: &'a OutputNaming,
    pub sheet_naming: &'a OutputNaming,
    pub keys: Option<&'a KeyStore>,
    pub progress: &'a ConsoleProgress,
}

impl TemplateGenerator<'_> {
    /// Processes every file, recording per-file failures instead of stopping.
    ///
    /// Fails only when the output folders cannot be created.
    pub fn generate(&self, files: &[LoadedFile], out_dir: &Path) -> anyhow::Result<GenerationReport> {
        let now = Local::now();
        let stamp = stamp(&now);
        let templates_dir = out_dir.join(format!("templates_{stamp}"));
        let sheets_dir = out_dir.join(format!("sheets_{stamp}"));
        std::fs::create_dir_all(&templates_dir)
            .with_context(|| format!("create templates dir: {}", templates_dir.display()))?;
        std::fs::create_dir_all(&sheets_dir)
            .with_context(|| format!("create sheets dir: {}", sheets_dir.display()))?;

        let mut report = GenerationReport {
            output_dir: out_dir.to_path_buf(),
            templates_dir,
            sheets_dir,
            generated: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            merged_sheet: None,
            merge_error: None,
        };

        for (i, file) in files.iter().enumerate() {
            self.progress.progress("templates", i + 1, files.len());
            let mut stage: Option<Stage> = None;
            match self.generate_one(file, &report.templates_dir, &report.sheets_dir, &mut stage) {
                Ok((generated, tags)) => {
                    self.progress.info(format!(
                        "{} -> {} ({} tag(s), {} field(s))",
                        file.path.display(),
                        generated.template.display(),
                        generated.tags,
                        generated.fields
                    ));
                    report.generated.push(generated);
                    if let Some(store) = self.keys {
                        if let Err(e) = store.merge_new(&tags) {
                            let msg = format!("key suggestions not updated: {e}");
                            self.progress.warn(&msg);
                            report.warnings.push(msg);
                        }
                    }
                }
                Err(e) => {
                    let at = stage.map(|s| s.to_string()).unwrap_or_else(|| "start".to_string());
                    self.progress
                        .warn(format!("{} failed after {at}: {e:#}", file.path.display()));
                    report.failures.push(FileFailure {
                        file: file.path.clone(),
                        stage,
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        if report.generated.len() > 1 {
            let sheets: Vec<PathBuf> = report.generated.iter().map(|g| g.sheet.clone()).collect();
            match merge_data_sheets(&sheets, out_dir, &now, self.progress) {
                Ok(merged) => report.merged_sheet = Some(merged.output),
                Err(e) => {
                    self.progress.warn(format!("sheet merge failed: {e:#}"));
                    report.merge_error = Some(format!("{e:#}"));
                }
            }
        }
        Ok(report)
    }

    fn generate_one(
        &self,
        file: &LoadedFile,
        templates_dir: &Path,
        sheets_dir: &Path,
        stage: &mut Option<Stage>,
    ) -> anyhow::Result<(GeneratedTemplate, Vec<String>)> {
        let stem = file.output_stem();
        let template = templates_dir.join(self.template_naming.file_name(&stem, "docx"));
        let sheet = sheets_dir.join(self.sheet_naming.file_name(&stem, "xml"));

        if !same_file(&file.path, &template) {
            std::fs::copy(&file.path, &template).with_context(|| {
                format!(
                    "copy template: {} -> {}",
                    file.path.display(),
                    template.display()
                )
            })?;
        }
        let mut pkg = DocxPackage::read(&template)?;
        let parts = ContentParts::discover(&pkg)?;
        let mut docs: Vec<XmlDocument> = parts
            .all()
            .map(|name| pkg.read_xml(name))
            .collect::<anyhow::Result<_>>()?;
        *stage = Some(Stage::Loaded);

        let tags = scan_tags(docs.iter().map(|d| &d.root));
        *stage = Some(Stage::Scanned);

        let tag_map = build_tag_map(&tags);
        let data = build_data_document(&tags, &tag_map);
        data.save(&sheet)?;
        *stage = Some(Stage::DataDocumentBuilt);

        let store_item_id = replace_data_part(&mut pkg, &parts.main, data.to_bytes()?)
            .with_context(|| format!("attach data part: {}", template.display()))?;
        let binder = ContentControlBinder::new(&tag_map, &store_item_id);
        let mut fields = 0;
        for doc in docs.iter_mut() {
            fields += binder.bind_part(&mut doc.root);
            pkg.write_xml(doc)?;
        }
        *stage = Some(Stage::ContentControlsBound);

        pkg.write(&template)?;
        *stage = Some(Stage::Persisted);

        Ok((
            GeneratedTemplate {
                source: file.path.clone(),
                template,
                sheet,
                tags: tags.len(),
                fields,
            },
            tags,
        ))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
