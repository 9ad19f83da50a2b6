//! Test fixture generator for officekit.
//!
//! Writes the DOCX and XLSX documents the real-engine integration tests
//! open, convert and render.

use anyhow::Result;
use docx_rs::{AlignmentType, BreakType, Docx, Paragraph, Run};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

fn main() -> Result<()> {
    let output_dir = Path::new("tests/fixtures/output");
    fs::create_dir_all(output_dir)?;

    println!("Generating test fixtures...\n");

    generate_simple_docx(output_dir)?;
    generate_paged_docx(output_dir)?;
    generate_sheets_xlsx(output_dir)?;

    // Error cases
    generate_corrupt_docx(output_dir)?;
    generate_empty_file(output_dir)?;

    println!("\nAll fixtures generated successfully!");
    Ok(())
}

/// Single page of plain text, used for selection and command tests.
fn generate_simple_docx(output_dir: &Path) -> Result<()> {
    let path = output_dir.join("simple.docx");
    println!("  Creating: {}", path.display());

    let docx = Docx::new()
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text("Hello, World! This is a simple test document.")),
        )
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text("It contains two paragraphs of plain text.")),
        );

    let file = File::create(&path)?;
    docx.build().pack(file)?;
    Ok(())
}

/// Exactly three pages, separated by explicit page breaks.
fn generate_paged_docx(output_dir: &Path) -> Result<()> {
    let path = output_dir.join("paged.docx");
    println!("  Creating: {}", path.display());

    let mut docx = Docx::new();
    for page in 1..=3 {
        if page > 1 {
            docx = docx
                .add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
        }
        docx = docx
            .add_paragraph(
                Paragraph::new()
                    .add_run(
                        Run::new()
                            .add_text(format!("Page {}", page))
                            .bold()
                            .size(48),
                    )
                    .align(AlignmentType::Center),
            )
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text(format!(
                "Body text for page {}. Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
                page
            ))));
    }

    let file = File::create(&path)?;
    docx.build().pack(file)?;
    Ok(())
}

/// Three named sheets.
fn generate_sheets_xlsx(output_dir: &Path) -> Result<()> {
    let path = output_dir.join("sheets.xlsx");
    println!("  Creating: {}", path.display());

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let quarters = [
        ("Q1", [10000.0, 12000.0, 11500.0]),
        ("Q2", [13000.0, 14500.0, 15000.0]),
        ("Q3", [14000.0, 13500.0, 16000.0]),
    ];

    for (name, revenues) in quarters {
        let sheet = workbook.add_worksheet().set_name(name)?;
        sheet.write_string_with_format(0, 0, "Month", &bold)?;
        sheet.write_string_with_format(0, 1, "Revenue", &bold)?;
        for (i, revenue) in revenues.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet.write_string(row, 0, format!("{} month {}", name, i + 1))?;
            sheet.write_number(row, 1, *revenue)?;
        }
    }

    workbook.save(&path)?;
    Ok(())
}

/// Not a ZIP archive at all.
fn generate_corrupt_docx(output_dir: &Path) -> Result<()> {
    let path = output_dir.join("corrupt.docx");
    println!("  Creating: {}", path.display());

    let mut file = File::create(&path)?;
    file.write_all(b"This is not a valid DOCX file. It's just garbage data.")?;
    Ok(())
}

/// Zero-byte file with a document extension.
fn generate_empty_file(output_dir: &Path) -> Result<()> {
    let path = output_dir.join("empty.docx");
    println!("  Creating: {}", path.display());

    File::create(&path)?;
    Ok(())
}
