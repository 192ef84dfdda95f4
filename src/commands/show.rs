use std::io::{self, Write};

use anyhow::{Context, Result, bail};

use crate::cli::ShowArgs;
use crate::commands::default_db_path;
use crate::model::FormRecord;
use crate::pipeline::CardStore;

pub fn run(args: ShowArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.output_dir));
    if !db_path.exists() {
        bail!("card store not found: {}", db_path.display());
    }

    let store = CardStore::open(&db_path)?;
    let card = store
        .load_card(&args.card_no)?
        .with_context(|| format!("card {} not found in {}", args.card_no, db_path.display()))?;

    if args.json {
        write_json_card(&card)
    } else {
        write_text_card(&card)
    }
}

fn write_json_card(card: &FormRecord) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, card).context("failed to serialize card json")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_card(card: &FormRecord) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    let article = &card.article;

    writeln!(output, "Card: {} ({})", article.card_no, article.issue_date)?;
    writeln!(output, "Article: {} / client {}", article.index, article.client_index)?;
    writeln!(output, "Description: {}", article.description)?;
    writeln!(
        output,
        "Structure: {} [{}] {}",
        article.structure, article.structure_thickness, article.structure_description
    )?;
    writeln!(output, "Composition: {}", article.chemical_composition)?;

    writeln!(output, "Properties: {}", card.properties.len())?;
    for row in &card.properties {
        writeln!(
            output,
            "  {} ({}): {} -{} +{} {}",
            row.name, row.method, row.value, row.minus, row.plus, row.unit
        )?;
    }

    let print = &card.print;
    writeln!(
        output,
        "Print: {} | layer={} direction={} symmetry={} colours={} lacquer={}",
        print.print_type,
        print.layer.map(|value| value.as_str()).unwrap_or("-"),
        print.direction.map(|value| value.as_str()).unwrap_or("-"),
        print.symmetry.map(|value| value.as_str()).unwrap_or("-"),
        print.colour_count,
        print.lacquer,
    )?;

    let packing = &card.packing;
    writeln!(
        output,
        "Packing: winding={} diameter={} core={} width={} extension={}",
        packing.winding_code,
        packing.external_diameter,
        packing.inner_core,
        packing.core_width,
        packing.core_extension,
    )?;
    writeln!(
        output,
        "Prepared by: {} on {}",
        card.signatures.prepared_by, card.signatures.prepared_on
    )?;

    output.flush()?;
    Ok(())
}
