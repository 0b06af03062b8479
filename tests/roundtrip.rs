use std::io::Write;
use std::path::{Path, PathBuf};

use docs_generator::docx::parts::find_data_parts;
use docs_generator::docx::tree::XmlElement;
use docs_generator::docx::{ContentParts, DocxPackage};
use docs_generator::pipeline::{
    DocumentGenerator, KeyPlacement, LoadedFile, OutputNaming, TemplateGenerator,
};
use docs_generator::progress::ConsoleProgress;
use docs_generator::store::KeyStore;
use docs_generator::template::scan::paragraph_text;
use docs_generator::template::DataDocument;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

fn paragraph(text: &str) -> String {
    format!(r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

/// Writes a minimal Word package with the given body paragraphs and optional header.
fn write_docx(path: &Path, body: &[&str], header: Option<&str>) {
    let paragraphs: String = body.iter().map(|t| paragraph(t)).collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body>{paragraphs}<w:sectPr/></w:body></w:document>"#
    );
    let header_rel = if header.is_some() {
        r#"<Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>"#
    } else {
        ""
    };
    let mut entries: Vec<(String, String)> = vec![
        (
            "[Content_Types].xml".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#.to_string(),
        ),
        ("word/document.xml".to_string(), document),
        (
            "word/_rels/document.xml.rels".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{header_rel}</Relationships>"#
            ),
        ),
    ];
    if let Some(text) = header {
        entries.push((
            "word/header1.xml".to_string(),
            format!(r#"<w:hdr xmlns:w="{W_NS}">{}</w:hdr>"#, paragraph(text)),
        ));
    }

    let file = std::fs::File::create(path).expect("create docx");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        zip.start_file(name, options).expect("start entry");
        zip.write_all(data.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish zip");
}

fn template_naming() -> OutputNaming {
    OutputNaming::new("_tpl", KeyPlacement::Suffix)
}

fn sheet_naming() -> OutputNaming {
    OutputNaming::new("_sheet", KeyPlacement::Suffix)
}

fn count_fields(root: &XmlElement) -> usize {
    root.count_descendants("w:sdt")
}

/// Visible text of every top-level paragraph in each content part, part by part.
fn part_texts(path: &Path) -> Vec<Vec<String>> {
    let pkg = DocxPackage::read(path).expect("read docx");
    let parts = ContentParts::discover(&pkg).expect("discover");
    parts
        .all()
        .map(|name| {
            let doc = pkg.read_xml(name).expect("part xml");
            let mut texts = Vec::new();
            doc.root.visit(&mut |e| {
                if e.name == "w:p" {
                    texts.push(paragraph_text(e));
                }
            });
            texts
        })
        .collect()
}

fn total_fields(path: &Path) -> usize {
    let pkg = DocxPackage::read(path).expect("read docx");
    let parts = ContentParts::discover(&pkg).expect("discover");
    parts
        .all()
        .map(|name| count_fields(&pkg.read_xml(name).expect("part xml").root))
        .sum()
}

#[test]
fn generate_then_fill_replaces_every_occurrence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("offer.docx");
    write_docx(&input, &["x {A} y {B} z {A} w", "plain"], Some("Ref {Head}"));
    let out = dir.path().join("out");
    let quiet = ConsoleProgress::new(false);
    let keys = KeyStore::new(dir.path().join("all_keys.json"));

    let (tn, sn) = (template_naming(), sheet_naming());
    let generator = TemplateGenerator {
        template_naming: &tn,
        sheet_naming: &sn,
        keys: Some(&keys),
        progress: &quiet,
    };
    let report = generator
        .generate(&[LoadedFile::new(&input, "")], &out)
        .expect("generate");
    assert!(!report.has_errors(), "{:?}", report.failures);
    assert_eq!(report.generated.len(), 1);
    assert!(report.merged_sheet.is_none(), "single file is not merged");
    let generated = &report.generated[0];
    assert_eq!(generated.tags, 3);
    assert_eq!(generated.fields, 4);
    assert_eq!(
        generated.template.file_name().and_then(|n| n.to_str()),
        Some("offer_tpl.docx")
    );
    assert!(generated.template.starts_with(&report.templates_dir));
    assert!(generated.sheet.starts_with(&report.sheets_dir));
    assert_eq!(keys.load(), vec!["A", "B", "Head"]);

    // Template text is unchanged; placeholders now sit in fields.
    assert_eq!(
        part_texts(&generated.template),
        vec![
            vec!["x {A} y {B} z {A} w".to_string(), "plain".to_string()],
            vec!["Ref {Head}".to_string()],
        ]
    );
    assert_eq!(total_fields(&generated.template), 4);

    let mut sheet = DataDocument::load(&generated.sheet).expect("load sheet");
    let names: Vec<&str> = sheet.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "Head"]);
    assert_eq!(sheet.value("A"), Some("{A}"));
    assert!(sheet.set_value("A", "1"));
    assert!(sheet.set_value("B", "2"));
    assert!(sheet.set_value("Head", "R-7"));
    assert!(!sheet.set_value("Missing", "x"));
    sheet.save(&generated.sheet).expect("save sheet");

    let docs_dir = dir.path().join("docs");
    let doc_naming = OutputNaming::new("", KeyPlacement::Omit);
    let filler = DocumentGenerator {
        naming: &doc_naming,
        progress: &quiet,
    };
    let fill = filler
        .generate(
            &[LoadedFile::new(&generated.template, "_tpl")],
            &generated.sheet,
            &docs_dir,
        )
        .expect("fill");
    assert!(!fill.has_errors(), "{:?}", fill.failures);
    assert_eq!(fill.filled.len(), 1);
    assert_eq!(fill.filled[0].fields, 4);
    let output = docs_dir.join("offer.docx");
    assert_eq!(fill.filled[0].output, output);
    assert_eq!(
        part_texts(&output),
        vec![
            vec!["x 1 y 2 z 1 w".to_string(), "plain".to_string()],
            vec!["Ref R-7".to_string()],
        ]
    );

    // The attached data part carries the filled values too.
    let pkg = DocxPackage::read(&output).expect("read output");
    let parts = find_data_parts(&pkg, "word/document.xml").expect("data parts");
    assert_eq!(parts.len(), 1);
    let item = pkg.entry(&parts[0].item).expect("item entry");
    let attached = DataDocument::parse(&item.data).expect("parse item");
    assert_eq!(attached.value("B"), Some("2"));
}

#[test]
fn regenerating_a_template_keeps_field_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("memo.docx");
    write_docx(&input, &["To {Name}, re {Subject}", "{Name}"], None);
    let quiet = ConsoleProgress::new(false);
    let (tn, sn) = (template_naming(), sheet_naming());
    let generator = TemplateGenerator {
        template_naming: &tn,
        sheet_naming: &sn,
        keys: None,
        progress: &quiet,
    };

    let first = generator
        .generate(&[LoadedFile::new(&input, "")], &dir.path().join("one"))
        .expect("first pass");
    let template = first.generated[0].template.clone();
    assert_eq!(total_fields(&template), 3);

    let second = generator
        .generate(&[LoadedFile::new(&template, "_tpl")], &dir.path().join("two"))
        .expect("second pass");
    assert!(!second.has_errors(), "{:?}", second.failures);
    let again = &second.generated[0];
    assert_eq!(again.fields, 0, "nothing new to bind");
    assert_eq!(again.tags, 2);
    assert_eq!(
        again.template.file_name().and_then(|n| n.to_str()),
        Some("memo_tpl.docx")
    );
    assert_eq!(total_fields(&again.template), 3);

    let pkg = DocxPackage::read(&again.template).expect("read");
    assert_eq!(
        find_data_parts(&pkg, "word/document.xml").expect("parts").len(),
        1,
        "previous data part is replaced"
    );
}

#[test]
fn batch_records_failures_and_merges_sheets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a.docx");
    let b = dir.path().join("b.docx");
    let broken = dir.path().join("broken.docx");
    write_docx(&a, &["{Client} and {OnlyA}"], None);
    write_docx(&b, &["{OnlyB} for {Client}"], None);
    std::fs::write(&broken, b"not a zip").expect("write broken");

    let out = dir.path().join("out");
    let quiet = ConsoleProgress::new(false);
    let (tn, sn) = (template_naming(), sheet_naming());
    let generator = TemplateGenerator {
        template_naming: &tn,
        sheet_naming: &sn,
        keys: None,
        progress: &quiet,
    };
    let files: Vec<LoadedFile> = [&a, &broken, &b]
        .into_iter()
        .map(|p| LoadedFile::new(p, ""))
        .collect();
    let report = generator.generate(&files, &out).expect("generate");

    assert!(report.has_errors());
    assert_eq!(report.generated.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].file, broken);
    assert_eq!(report.failures[0].stage, None);
    assert!(report.summary().contains("2 generated, 1 failed"));

    let merged: PathBuf = report.merged_sheet.clone().expect("merged sheet");
    assert_eq!(merged.parent(), Some(out.as_path()));
    assert!(merged
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with("_data_sheet.xml")));
    let doc = DataDocument::load(&merged).expect("load merged");
    let names: Vec<&str> = doc.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Client", "OnlyA", "OnlyB"]);
}
