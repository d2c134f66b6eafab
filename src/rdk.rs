extern crate clap;
use clap::*;

mod cmd_rdk;

fn main() -> anyhow::Result<()> {
    let app = Command::new("rdk")
        .version(crate_version!())
        .about("`rdk` - Reads, Duplicates, K-mers")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .subcommand(cmd_rdk::encode::make_subcommand())
        .subcommand(cmd_rdk::contained::make_subcommand())
        .subcommand(cmd_rdk::scan::make_subcommand())
        .subcommand(cmd_rdk::index::make_subcommand())
        .after_help(
            r###"
Subcommand groups:

* Read set encoding:
    * encode   - two-bit encode read libraries
    * scan     - enumerate k-mer codes of an encoded read set

* Indexing:
    * contained - detect duplicated and contained reads
    * index     - full k-mer bucket suffix index

"###,
        );

    // Check which subcomamnd the user ran...
    match app.get_matches().subcommand() {
        Some(("encode", sub_matches)) => cmd_rdk::encode::execute(sub_matches),
        Some(("contained", sub_matches)) => cmd_rdk::contained::execute(sub_matches),
        Some(("scan", sub_matches)) => cmd_rdk::scan::execute(sub_matches),
        Some(("index", sub_matches)) => cmd_rdk::index::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
