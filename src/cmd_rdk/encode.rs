use clap::{Arg, ArgMatches, Command};

pub fn make_subcommand() -> Command {
    let cmd = Command::new("encode")
        .about("Two-bit encode read libraries")
        .after_help(
            r###"
Examples:
  # Encode an unpaired FASTA library
  rdk encode --db reads.fa --indexname idx

  # A paired two-file FASTQ library, insert length 250, stdev 30
  rdk encode --db r1.fq:r2.fq:250-30 --indexname idx --maxlow 4 --lowqual 10

Outputs: idx.esq (+ idx.ssp for variable lengths), idx.rlt,
idx.hpl with --rle.
"###,
        )
        .arg(
            Arg::new("indexname")
                .long("indexname")
                .value_name("PATH")
                .help("Index file name prefix")
                .required(true),
        );
    super::add_encode_args(cmd)
}

pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let indexname = args.get_one::<String>("indexname").unwrap();

    let mut r2t = super::readset_from_args(args, indexname)?;
    super::print_readset_stats(&r2t);

    r2t.write_encseq()?;
    r2t.write_seppos_default(None)?;
    r2t.write_libraries_table()?;
    if args.get_flag("rle") && r2t.total_seqlength() > 0 {
        r2t.write_hplengths()?;
    }

    if args.get_flag("verbose") {
        println!("==> Outputs");
        println!("    \"esq\" written");
        if r2t.seqlen_eqlen() == 0 {
            println!("    \"ssp\" written");
        }
    }

    Ok(())
}
