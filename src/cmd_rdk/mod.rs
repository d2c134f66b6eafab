pub mod contained;
pub mod encode;
pub mod index;
pub mod scan;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use itertools::Itertools;
use rdk::libs::reads::Reads2Twobit;

/// Arguments shared by every subcommand that encodes read libraries.
pub(crate) fn add_encode_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("db")
            .long("db")
            .value_name("LIBSPEC")
            .help("Read library: file | file1:file2:len[-stdev] | file:len[-stdev]")
            .num_args(1..)
            .required(true),
    )
    .arg(
        Arg::new("phred64")
            .long("phred64")
            .action(ArgAction::SetTrue)
            .help("Quality scores use the Phred+64 base"),
    )
    .arg(
        Arg::new("maxlow")
            .long("maxlow")
            .value_name("N")
            .value_parser(value_parser!(u64))
            .help("Drop reads with more than N low-quality bases"),
    )
    .arg(
        Arg::new("lowqual")
            .long("lowqual")
            .value_name("Q")
            .value_parser(value_parser!(u8))
            .default_value("0")
            .help("Phred score at or below which a base counts as low"),
    )
    .arg(
        Arg::new("rle")
            .long("rle")
            .action(ArgAction::SetTrue)
            .help("Compress homopolymer runs, keeping the lengths aside"),
    )
    .arg(
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .action(ArgAction::SetTrue)
            .help("Verbose mode"),
    )
}

pub(crate) fn readset_from_args(args: &ArgMatches, indexname: &str) -> anyhow::Result<Reads2Twobit> {
    let mut r2t = Reads2Twobit::new(indexname);
    for libspec in args.get_many::<String>("db").unwrap() {
        r2t.add_library(libspec)?;
    }
    if args.get_flag("phred64") {
        r2t.set_phred64();
    }
    if let Some(maxlow) = args.get_one::<u64>("maxlow") {
        let lowqual = *args.get_one::<u8>("lowqual").unwrap();
        r2t.set_quality_filter(*maxlow, lowqual);
    }
    if args.get_flag("rle") {
        r2t.use_rle();
    }
    r2t.encode()?;
    Ok(r2t)
}

pub(crate) fn print_readset_stats(r2t: &Reads2Twobit) {
    println!("==> Read set");
    println!(
        "    libraries = {}",
        r2t.libraries().iter().map(|rli| rli.name()).join("; ")
    );
    println!("    sequences = {}", r2t.nofseqs());
    if r2t.seqlen_eqlen() > 0 {
        println!("    eqlen     = {}", r2t.seqlen_eqlen());
    } else {
        println!("    eqlen     = 0 (variable)");
        println!(
            "    min / max = {} / {}",
            r2t.seqlen_min(),
            r2t.seqlen_max()
        );
    }
    println!("    total     = {}", r2t.total_seqlength());
    println!(
        "    invalid   = {} ({} bp)",
        r2t.nof_invalid_seqs(),
        r2t.invalid_seqs_totallength()
    );
    println!("    distri    = {:?}", r2t.chardistri());
}
