// shpbridge inspector
// Prints the fields, extent, shape type and record count of a shapefile set

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use shpbridge::io::{read_metadata, ReadOptions};
use shpbridge::Encoding;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Any file of the set (.shp, .dbf or .shx)
    path: PathBuf,

    /// Text encoding of the .dbf file
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let encoding: Encoding = args.encoding.parse()?;
    let metadata = read_metadata(&args.path, &ReadOptions { encoding })?;

    println!("shape type: {}", metadata.shape_type);
    println!("records:    {}", metadata.num_entries);
    let [x_min, y_min, x_max, y_max] = metadata.bbox.xy();
    println!("bbox:       {} {} {} {}", x_min, y_min, x_max, y_max);
    if metadata.shape_type.has_z() {
        println!("z range:    {} {}", metadata.bbox.z_min, metadata.bbox.z_max);
    }
    if metadata.shape_type.has_m() {
        println!("m range:    {} {}", metadata.bbox.m_min, metadata.bbox.m_max);
    }
    println!("fields:");
    for field in &metadata.fields {
        println!(
            "  {:<10} {} {:>3} {:>2}",
            field.name,
            field.field_type.code() as char,
            field.length,
            field.decimal_count
        );
    }
    Ok(())
}
