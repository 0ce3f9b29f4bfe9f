use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rayon::ThreadPoolBuilder;
use rtok::corpus::collect_paths;
use rtok::{
    BpeLearner, BpeLearnerConfig, CorpusConfig, Mode, SentencePieceLearner,
    SentencePieceLearnerConfig, SubwordLearner, Tokenizer, TokenizerOptions, Vocab,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reversible tokenization toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    /// Limit Rayon worker threads
    #[arg(long, global = true, value_name = "N")]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenize text line by line
    Tokenize(StreamArgs),
    /// Detokenize tokenized text line by line
    Detokenize(StreamArgs),
    /// Learn BPE merges from a corpus
    LearnBpe(LearnBpeArgs),
    /// Learn a unigram SentencePiece model from a corpus
    LearnSp(LearnSpArgs),
    /// Count tokens into a vocabulary
    BuildVocab(BuildVocabArgs),
}

#[derive(Args, Debug, Default)]
struct TokenizationArgs {
    /// JSON file with tokenizer options; flags below override it
    #[arg(long = "options", value_name = "PATH")]
    options_file: Option<PathBuf>,

    /// Segmentation mode: none, space, conservative, aggressive, char
    #[arg(short = 'm', long, value_name = "MODE")]
    mode: Option<Mode>,

    /// Informational language code
    #[arg(long, value_name = "LANG")]
    lang: Option<String>,

    /// Keep reserved characters verbatim
    #[arg(long)]
    no_substitution: bool,

    /// Emit whitespace as tokens
    #[arg(long)]
    with_separators: bool,

    /// Mark joined tokens with the joiner
    #[arg(long)]
    joiner_annotate: bool,

    /// Joiner string
    #[arg(long, value_name = "STR")]
    joiner: Option<String>,

    /// Emit joiners as standalone tokens
    #[arg(long)]
    joiner_new: bool,

    /// Mark spaced tokens with the spacer
    #[arg(long)]
    spacer_annotate: bool,

    /// Emit spacers as standalone tokens
    #[arg(long)]
    spacer_new: bool,

    /// Never attach markers to placeholders
    #[arg(long)]
    preserve_placeholders: bool,

    /// Never attach markers to tokens split by --segment-* rules
    #[arg(long)]
    preserve_segmented_tokens: bool,

    /// Read joiners already present in the input
    #[arg(long)]
    support_prior_joiners: bool,

    /// Lowercase tokens and append a case feature
    #[arg(long)]
    case_feature: bool,

    /// Lowercase tokens and insert case markup tokens
    #[arg(long)]
    case_markup: bool,

    /// Let case regions span case invariant tokens
    #[arg(long)]
    soft_case_regions: bool,

    /// Split on casing changes
    #[arg(long)]
    segment_case: bool,

    /// Split numbers digit by digit
    #[arg(long)]
    segment_numbers: bool,

    /// Split every character of this script (repeat flag)
    #[arg(long = "segment-alphabet", value_name = "SCRIPT")]
    segment_alphabet: Vec<String>,

    /// Split letter runs on script changes
    #[arg(long)]
    segment_alphabet_change: bool,

    /// BPE merge file
    #[arg(long, value_name = "PATH")]
    bpe_model: Option<PathBuf>,

    /// BPE dropout probability
    #[arg(long, value_name = "P")]
    bpe_dropout: Option<f32>,

    /// Serialized SentencePiece model (.model)
    #[arg(long, value_name = "PATH")]
    sp_model: Option<PathBuf>,

    /// SentencePiece sampling size (0 disables sampling, negative samples the lattice)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    sp_nbest_size: Option<i32>,

    /// SentencePiece sampling temperature
    #[arg(long, value_name = "ALPHA")]
    sp_alpha: Option<f32>,

    /// Vocabulary restricting subword output
    #[arg(long, value_name = "PATH")]
    vocabulary: Option<PathBuf>,

    /// Minimum vocabulary frequency
    #[arg(long, value_name = "COUNT", default_value_t = 0)]
    vocabulary_threshold: u64,
}

impl TokenizationArgs {
    fn to_options(&self, default_mode: Mode) -> Result<TokenizerOptions> {
        let mut options = match &self.options_file {
            Some(path) => TokenizerOptions::from_json_file(path)
                .with_context(|| format!("failed to read options from {}", path.display()))?,
            None => TokenizerOptions::with_mode(default_mode),
        };
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(lang) = &self.lang {
            options.lang.clone_from(lang);
        }
        if let Some(joiner) = &self.joiner {
            options.joiner.clone_from(joiner);
        }
        options.no_substitution |= self.no_substitution;
        options.with_separators |= self.with_separators;
        options.joiner_annotate |= self.joiner_annotate;
        options.joiner_new |= self.joiner_new;
        options.spacer_annotate |= self.spacer_annotate;
        options.spacer_new |= self.spacer_new;
        options.preserve_placeholders |= self.preserve_placeholders;
        options.preserve_segmented_tokens |= self.preserve_segmented_tokens;
        options.support_prior_joiners |= self.support_prior_joiners;
        options.case_feature |= self.case_feature;
        options.case_markup |= self.case_markup;
        options.soft_case_regions |= self.soft_case_regions;
        options.segment_case |= self.segment_case;
        options.segment_numbers |= self.segment_numbers;
        options.segment_alphabet_change |= self.segment_alphabet_change;
        options
            .segment_alphabet
            .extend(self.segment_alphabet.iter().cloned());
        if let Some(path) = &self.bpe_model {
            options.bpe_model_path = Some(path.clone());
        }
        if let Some(dropout) = self.bpe_dropout {
            options.bpe_dropout = dropout;
        }
        if let Some(path) = &self.sp_model {
            options.sp_model_path = Some(path.clone());
        }
        if let Some(nbest_size) = self.sp_nbest_size {
            options.sp_nbest_size = nbest_size;
        }
        if let Some(alpha) = self.sp_alpha {
            options.sp_alpha = alpha;
        }
        if let Some(path) = &self.vocabulary {
            options.vocabulary_path = Some(path.clone());
            options.vocabulary_threshold = self.vocabulary_threshold;
        }
        Ok(options.normalized()?)
    }
}

#[derive(Args, Debug)]
struct StreamArgs {
    #[command(flatten)]
    tokenization: TokenizationArgs,

    /// Input file (stdin when omitted)
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Token delimiter
    #[arg(long, value_name = "STR", default_value = " ")]
    delimiter: String,
}

#[derive(Args, Debug)]
struct CorpusArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Disable recursive directory traversal
    #[arg(long)]
    no_recursive: bool,

    /// Follow symlinks during traversal
    #[arg(long)]
    follow_symlinks: bool,
}

impl CorpusArgs {
    fn files(&self) -> Result<Vec<PathBuf>> {
        let cfg = CorpusConfig {
            recursive: !self.no_recursive,
            follow_symlinks: self.follow_symlinks,
        };
        collect_paths(&self.inputs, &cfg).context("failed to discover inputs")
    }
}

#[derive(Args, Debug)]
struct LearnBpeArgs {
    #[command(flatten)]
    tokenization: TokenizationArgs,

    #[command(flatten)]
    corpus: CorpusArgs,

    /// Output merge file (stdout when omitted)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Number of merges to learn
    #[arg(short = 's', long, value_name = "COUNT", default_value_t = 10_000)]
    symbols: usize,

    /// Stop when the most frequent pair is seen fewer times
    #[arg(long, value_name = "COUNT", default_value_t = 2)]
    min_frequency: u64,

    /// Inputs are `word count` lines
    #[arg(long)]
    dict_input: bool,

    /// Count initial characters against --symbols
    #[arg(long)]
    total_symbols: bool,

    /// Comment written at the top of the merge file
    #[arg(long, value_name = "TEXT")]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct LearnSpArgs {
    #[command(flatten)]
    tokenization: TokenizationArgs,

    #[command(flatten)]
    corpus: CorpusArgs,

    /// Output model file (stdout when omitted)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Target number of pieces
    #[arg(long, value_name = "SIZE", default_value_t = 8000)]
    vocab_size: u32,

    /// Longest piece, in characters
    #[arg(long, value_name = "LEN", default_value_t = 16)]
    max_piece_length: usize,

    /// Unknown piece
    #[arg(long, value_name = "TOKEN", default_value = "<unk>")]
    unk_token: String,

    /// Piece always kept in the inventory (repeat flag)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,

    /// Also write `<output>.vocab`
    #[arg(long)]
    keep_vocab: bool,
}

#[derive(Args, Debug)]
struct BuildVocabArgs {
    #[command(flatten)]
    tokenization: TokenizationArgs,

    #[command(flatten)]
    corpus: CorpusArgs,

    /// Output vocabulary file (stdout when omitted)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Tokenize inputs before counting; otherwise they are split on spaces
    #[arg(long)]
    tokenize: bool,

    /// Maximum vocabulary size (0 keeps everything)
    #[arg(long, value_name = "SIZE", default_value_t = 0)]
    size: usize,

    /// Minimum token frequency
    #[arg(long, value_name = "COUNT", default_value_t = 1)]
    min_frequency: u64,

    /// Token placed first in the vocabulary (repeat flag)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Some(threads) = cli.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("unable to configure Rayon thread pool")?;
    }

    let show_progress = cli.quiet == 0;
    match cli.command {
        Commands::Tokenize(args) => run_stream(args, Direction::Tokenize),
        Commands::Detokenize(args) => run_stream(args, Direction::Detokenize),
        Commands::LearnBpe(args) => run_learn_bpe(args, show_progress),
        Commands::LearnSp(args) => run_learn_sp(args, show_progress),
        Commands::BuildVocab(args) => run_build_vocab(args, show_progress),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = match (quiet, verbose) {
        (0, 0) => LevelFilter::Info,
        (0, 1) => LevelFilter::Debug,
        (0, _) => LevelFilter::Trace,
        (1, _) => LevelFilter::Warn,
        _ => LevelFilter::Error,
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Tokenize,
    Detokenize,
}

fn run_stream(args: StreamArgs, direction: Direction) -> Result<()> {
    let options = args.tokenization.to_options(Mode::Conservative)?;
    let tokenizer = Tokenizer::new(options).context("failed to build tokenizer")?;

    if let (Some(input), Some(output)) = (&args.input, &args.output) {
        let result = match direction {
            Direction::Tokenize => tokenizer.tokenize_file(input, output, &args.delimiter),
            Direction::Detokenize => tokenizer.detokenize_file(input, output, &args.delimiter),
        };
        return result.with_context(|| {
            format!("failed to process {} into {}", input.display(), output.display())
        });
    }

    let stdin = io::stdin();
    let mut reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(stdin.lock()),
    };
    let stdout = io::stdout();
    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(stdout.lock())),
    };

    match direction {
        Direction::Tokenize => {
            tokenizer.tokenize_stream(&mut *reader, &mut *writer, &args.delimiter)?;
        }
        Direction::Detokenize => {
            tokenizer.detokenize_stream(&mut *reader, &mut *writer, &args.delimiter)?;
        }
    }
    Ok(())
}

fn ingest_with_progress(
    learner: &mut dyn SubwordLearner,
    files: &[PathBuf],
    show_progress: bool,
) -> Result<()> {
    let bar = if show_progress {
        let bar = ProgressBar::new(files.len() as u64);
        let style =
            ProgressStyle::with_template("{bar:40} {pos}/{len} files ingested {elapsed}")
                .context("invalid progress template")?;
        bar.set_style(style);
        Some(bar)
    } else {
        None
    };

    for path in files {
        learner
            .ingest_file(path)
            .with_context(|| format!("failed to ingest {}", path.display()))?;
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    Ok(())
}

fn spinner(show_progress: bool, message: &'static str) -> Result<Option<ProgressBar>> {
    if !show_progress {
        return Ok(None);
    }
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner} {msg} {elapsed}")
        .context("invalid progress template")?;
    bar.set_style(style);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    Ok(Some(bar))
}

fn learn_to(
    learner: &mut dyn SubwordLearner,
    output: Option<&Path>,
    description: Option<&str>,
) -> Result<()> {
    match output {
        Some(path) => learner
            .learn(path, description)
            .with_context(|| format!("failed to write model to {}", path.display())),
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            learner.learn_to_writer(&mut out, description)?;
            out.flush().context("failed to flush stdout")
        }
    }
}

fn run_learn_bpe(args: LearnBpeArgs, show_progress: bool) -> Result<()> {
    let options = args.tokenization.to_options(Mode::Space)?;
    let cfg = BpeLearnerConfig::builder()
        .symbols(args.symbols)
        .min_frequency(args.min_frequency)
        .dict_input(args.dict_input)
        .total_symbols(args.total_symbols)
        .verbose(show_progress)
        .build()?;
    let mut learner = BpeLearner::new(cfg, Some(options))?;

    let files = args.corpus.files()?;
    ingest_with_progress(&mut learner, &files, show_progress)?;
    info!(
        "ingested {} distinct words from {} files",
        learner.distinct_words(),
        files.len()
    );

    let start = Instant::now();
    let bar = spinner(show_progress, "learning merges...")?;
    learn_to(&mut learner, args.output.as_deref(), args.description.as_deref())?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if let Some(metrics) = learner.last_metrics() {
        info!(
            "learned {} merges in {:.2?} (stop reason: {:?})",
            metrics.merges.len(),
            start.elapsed(),
            metrics.stop_reason
        );
    }
    Ok(())
}

fn run_learn_sp(args: LearnSpArgs, show_progress: bool) -> Result<()> {
    if args.keep_vocab && args.output.is_none() {
        bail!("--keep-vocab requires --output");
    }
    let options = args.tokenization.to_options(Mode::Space)?;
    let cfg = SentencePieceLearnerConfig::builder()
        .vocab_size(args.vocab_size)
        .max_piece_length(args.max_piece_length)
        .unk_token(args.unk_token.clone())
        .special_tokens(args.special_tokens.iter().cloned())
        .keep_vocab(args.keep_vocab)
        .verbose(show_progress)
        .build()?;
    let mut learner = SentencePieceLearner::new(cfg, Some(options))?;

    let files = args.corpus.files()?;
    ingest_with_progress(&mut learner, &files, show_progress)?;
    info!(
        "ingested {} distinct words from {} files",
        learner.distinct_words(),
        files.len()
    );

    let start = Instant::now();
    learn_to(&mut learner, args.output.as_deref(), None)?;
    info!("trained SentencePiece model in {:.2?}", start.elapsed());
    Ok(())
}

fn run_build_vocab(args: BuildVocabArgs, show_progress: bool) -> Result<()> {
    let tokenizer = if args.tokenize {
        let options = args.tokenization.to_options(Mode::Conservative)?;
        Some(Tokenizer::new(options).context("failed to build tokenizer")?)
    } else {
        None
    };

    let files = args.corpus.files()?;
    let bar = spinner(show_progress, "counting tokens...")?;
    let mut vocab = Vocab::new(args.special_tokens.iter().cloned());
    for path in &files {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        vocab
            .add_from_reader(&mut BufReader::new(file), tokenizer.as_ref())
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let counted = vocab.len();
    vocab.resize(args.size, args.min_frequency);
    info!("kept {} of {} distinct tokens", vocab.len(), counted);

    match &args.output {
        Some(path) => vocab
            .save(path)
            .with_context(|| format!("failed to write vocabulary to {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            vocab.write_to(&mut out)?;
            out.flush().context("failed to flush stdout")?;
        }
    }
    Ok(())
}
