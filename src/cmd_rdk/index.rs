use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rdk::libs::contfinder::Contfinder;
use rdk::libs::reads::{SUFFIX_CLB, SUFFIX_CPN, SUFFIX_SPMSUFTAB};
use rdk::libs::suffix::{merge_sorted_streams, sort_suffixes, SuffixSortOptions};

pub fn make_subcommand() -> Command {
    let cmd = Command::new("index")
        .about("Build the k-mer bucket suffix index of a read set")
        .after_help(
            r###"
The full pipeline: encode the libraries, drop contained reads (and their
mates), write the index files, then bucket-sort all suffixes by k-mer
keys in one or more memory-bounded parts.

Examples:
  rdk index --db reads.fa --indexname idx --kmersize 14
  rdk index --db r1.fq:r2.fq:250 --indexname idx --memlimit 2000000000
  rdk index --db reads.fa --indexname idx --parts 4 --threads 8 --mirror

Outputs: idx.esq, idx.ssp (variable lengths), idx.rlt, idx.clb, idx.cpn
(equal lengths), idx.hpl (--rle), idx.spmsuftab.
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
            Arg::new("kmersize")
                .long("kmersize")
                .short('k')
                .value_name("K")
                .value_parser(value_parser!(u32).range(2..=32))
                .default_value("14")
                .help("Bucket key size"),
        )
        .arg(
            Arg::new("parts")
                .long("parts")
                .value_name("N")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("1")
                .help("Number of memory-bounded parts"),
        )
        .arg(
            Arg::new("memlimit")
                .long("memlimit")
                .value_name("BYTES")
                .value_parser(value_parser!(u64))
                .help("Memory budget; picks the number of parts automatically"),
        )
        .arg(
            Arg::new("sortingdepth")
                .long("sortingdepth")
                .value_name("D")
                .value_parser(value_parser!(u64))
                .default_value("0")
                .help("Sort suffixes only to this depth (0 = to the read ends)"),
        )
        .arg(
            Arg::new("skipshorter")
                .long("skipshorter")
                .value_name("S")
                .value_parser(value_parser!(u32))
                .default_value("0")
                .help("Skip suffixes shorter than S (0 = kmersize; must be >= kmersize)"),
        )
        .arg(
            Arg::new("sampling")
                .long("sampling")
                .value_name("FACTOR")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("50")
                .help("Bucket key sampling factor"),
        )
        .arg(
            Arg::new("firstcodes")
                .long("firstcodes")
                .action(ArgAction::SetTrue)
                .help("Use the first code of every sequence as bucket keys instead of sampling"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .short('t')
                .value_name("T")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("1")
                .help("Worker threads for bucket sorting"),
        )
        .arg(
            Arg::new("mirror")
                .long("mirror")
                .action(ArgAction::SetTrue)
                .help("Index the reverse complements too"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("U64")
                .value_parser(value_parser!(u64))
                .default_value("0")
                .help("Seed of the sampling position generator"),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .action(ArgAction::SetTrue)
                .help("Print the sorted suffix positions"),
        );
    super::add_encode_args(cmd)
}

pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let indexname = args.get_one::<String>("indexname").unwrap();
    let mirror = args.get_flag("mirror");
    let verbose = args.get_flag("verbose");

    let mut r2t = super::readset_from_args(args, indexname)?;
    super::print_readset_stats(&r2t);
    if r2t.nofseqs() == 0 {
        anyhow::bail!("no valid sequences to index");
    }

    // contained-read removal
    let mut contfinder = Contfinder::new(
        r2t.twobitencoding(),
        r2t.nofseqs(),
        r2t.seqlen_eqlen(),
        r2t.seppos(),
    );
    let with_copynum = r2t.seqlen_eqlen() > 0;
    contfinder.run(mirror, with_copynum);
    println!("==> Contained reads");
    println!("    contained = {}", contfinder.nofcontained());
    let clb = format!("{}{}", indexname, SUFFIX_CLB);
    contfinder.write_cntlist(clb.as_ref())?;
    if with_copynum {
        let cpn = format!("{}{}", indexname, SUFFIX_CPN);
        contfinder.write_copynum(cpn.as_ref())?;
    }
    if contfinder.nofcontained() > 0 {
        let mut skip = contfinder.into_contained();
        let nofmates = r2t.mark_mates_of_contained(&mut skip);
        if verbose && nofmates > 0 {
            println!("    mates of contained reads marked: {}", nofmates);
        }
        r2t.delete_sequences(&skip);
        println!("    remaining = {}", r2t.nofseqs());
    }

    r2t.write_encseq()?;
    r2t.write_seppos_default(None)?;
    r2t.write_libraries_table()?;
    if args.get_flag("rle") && r2t.total_seqlength() > 0 {
        r2t.write_hplengths()?;
    }

    let opts = SuffixSortOptions {
        kmersize: *args.get_one::<u32>("kmersize").unwrap(),
        skip_shorter: *args.get_one::<u32>("skipshorter").unwrap(),
        numofparts: *args.get_one::<u32>("parts").unwrap(),
        memlimit: args.get_one::<u64>("memlimit").copied(),
        sorting_depth: *args.get_one::<u64>("sortingdepth").unwrap(),
        sampling_factor: *args.get_one::<u32>("sampling").unwrap(),
        use_firstcodes: args.get_flag("firstcodes"),
        threads: *args.get_one::<u32>("threads").unwrap(),
        seed: *args.get_one::<u64>("seed").unwrap(),
    };

    let dump = args.get_flag("dump");
    let mut dumped: Vec<Vec<(u64, (u64, u64))>> = Vec::new();
    let mut collect = |part: u32, code: u64, pairs: &[(u64, u64)], _lcps: &[u16]| {
        if dumped.len() <= part as usize {
            dumped.resize(part as usize + 1, Vec::new());
        }
        dumped[part as usize].extend(pairs.iter().map(|&pair| (code, pair)));
    };

    let view = r2t.view(mirror);
    let suftab_path = format!("{}{}", indexname, SUFFIX_SPMSUFTAB);
    let stats = sort_suffixes(
        &view,
        &opts,
        Some(suftab_path.as_ref()),
        if dump { Some(&mut collect) } else { None },
    )?;

    println!("==> Suffix index");
    println!("    bucket keys = {}", stats.different_codes);
    println!("    suffixes    = {}", stats.total_count);
    println!("    parts       = {}", stats.numofparts);
    if verbose {
        println!("    max bucket  = {}", stats.maxbucketsize);
        println!("    largest part width = {}", stats.largest_width);
        println!(
            "    flush rounds = {} + {}",
            stats.accum_flushes, stats.insert_flushes
        );
    }

    if dump {
        // more than two part streams go through the k-way merge; fewer
        // concatenate directly since the parts cover ascending key ranges
        let merged: Vec<(u64, (u64, u64))> = if dumped.len() > 2 {
            merge_sorted_streams(dumped.into_iter().map(|s| s.into_iter()).collect())
        } else {
            dumped.into_iter().flatten().collect()
        };
        for (_code, (seqnum, relpos)) in merged {
            println!("{} {}", seqnum, relpos);
        }
    }

    Ok(())
}
