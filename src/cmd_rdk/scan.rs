use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rdk::libs::suffix::kmerscan::kmerscan;
use rdk::libs::twobit::code_to_bases;

pub fn make_subcommand() -> Command {
    let cmd = Command::new("scan")
        .about("Enumerate the k-mer codes of a read set")
        .after_help(
            r###"
Prints one line per emitted k-mer:
  first-in-sequence (T/F), code, seqnum, relpos [, bases]

With --mirror the reverse-complement codes are emitted too, attributed
to the mirror sequence numbers.

Examples:
  rdk scan --db reads.fa --kmersize 3
  rdk scan --db reads.fa --kmersize 16 --mirror --bases
"###,
        )
        .arg(
            Arg::new("kmersize")
                .long("kmersize")
                .short('k')
                .value_name("K")
                .value_parser(value_parser!(u32).range(2..=32))
                .default_value("14")
                .help("k-mer size"),
        )
        .arg(
            Arg::new("mirror")
                .long("mirror")
                .action(ArgAction::SetTrue)
                .help("Also emit reverse-complement codes"),
        )
        .arg(
            Arg::new("bases")
                .long("bases")
                .action(ArgAction::SetTrue)
                .help("Append the decoded k-mer text"),
        );
    super::add_encode_args(cmd)
}

pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let kmersize = *args.get_one::<u32>("kmersize").unwrap();
    let mirror = args.get_flag("mirror");
    let bases = args.get_flag("bases");

    let r2t = super::readset_from_args(args, "rdk-scan")?;
    let view = r2t.view(mirror);

    kmerscan(&view, kmersize, kmersize, |code, seqnum, relpos| {
        let first = if relpos == 0 { 'T' } else { 'F' };
        if bases {
            println!(
                "{} {} {} {} {}",
                first,
                code,
                seqnum,
                relpos,
                code_to_bases(code, kmersize)
            );
        } else {
            println!("{} {} {} {}", first, code, seqnum, relpos);
        }
    });

    Ok(())
}
