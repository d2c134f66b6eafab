use clap::{Arg, ArgAction, ArgMatches, Command};
use rdk::libs::contfinder::Contfinder;
use rdk::libs::reads::{SUFFIX_CLB, SUFFIX_CPN};

pub fn make_subcommand() -> Command {
    let cmd = Command::new("contained")
        .about("Detect duplicated and contained reads")
        .after_help(
            r###"
A read is contained when it equals another read or is a strict prefix of
one, optionally considering reverse complements (--mirror).

Examples:
  rdk contained --db reads.fa --indexname idx
  rdk contained --db reads.fa --indexname idx --mirror --copynum
  rdk contained --db r1.fa:r2.fa:300 --indexname idx --write-fasta

Outputs: idx.clb (contained-read bit list), idx.cpn with --copynum,
idx.fas with --write-fasta.
"###,
        )
        .arg(
            Arg::new("indexname")
                .long("indexname")
                .value_name("PATH")
                .help("Index file name prefix")
                .required(true),
        )
        .arg(
            Arg::new("mirror")
                .long("mirror")
                .action(ArgAction::SetTrue)
                .help("Also consider the reverse complements"),
        )
        .arg(
            Arg::new("copynum")
                .long("copynum")
                .action(ArgAction::SetTrue)
                .help("Record copy numbers per surviving read (equal lengths only)"),
        )
        .arg(
            Arg::new("write_fasta")
                .long("write-fasta")
                .action(ArgAction::SetTrue)
                .help("Write the surviving reads as FASTA"),
        );
    super::add_encode_args(cmd)
}

pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let indexname = args.get_one::<String>("indexname").unwrap();
    let mirror = args.get_flag("mirror");
    let copynum = args.get_flag("copynum");

    let r2t = super::readset_from_args(args, indexname)?;
    super::print_readset_stats(&r2t);

    if copynum && r2t.seqlen_eqlen() == 0 {
        anyhow::bail!("--copynum requires reads of equal length");
    }
    if r2t.nofseqs() == 0 {
        println!("==> Contained reads");
        println!("    contained = 0");
        return Ok(());
    }

    let mut contfinder = Contfinder::new(
        r2t.twobitencoding(),
        r2t.nofseqs(),
        r2t.seqlen_eqlen(),
        r2t.seppos(),
    );
    contfinder.run(mirror, copynum);

    println!("==> Contained reads");
    println!("    contained = {}", contfinder.nofcontained());
    println!(
        "    remaining = {}",
        r2t.nofseqs() - contfinder.nofcontained()
    );

    let clb = format!("{}{}", indexname, SUFFIX_CLB);
    contfinder.write_cntlist(clb.as_ref())?;
    if copynum {
        let cpn = format!("{}{}", indexname, SUFFIX_CPN);
        contfinder.write_copynum(cpn.as_ref())?;
    }

    if args.get_flag("write_fasta") {
        let mut skip = contfinder.into_contained();
        let nofmates = r2t.mark_mates_of_contained(&mut skip);
        if args.get_flag("verbose") && nofmates > 0 {
            println!("    mates of contained reads marked: {}", nofmates);
        }
        let fas = format!("{}.fas", indexname);
        r2t.write_fasta(fas.as_ref(), Some(&skip))?;
    }

    Ok(())
}
