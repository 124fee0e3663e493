use kernel_hwspinlock::regfile::LOCKS_PER_BLOCK;
use kernel_hwspinlock_selftest::{ParamError, SelftestConfig, variant};
use log::LevelFilter;
use std::str::FromStr;

pub const DEFAULT_COMPATIBLE: &str = "ti,omap4-hwspinlock-test";

pub const USAGE: &str = "\
usage: hwspinlock-selftest [options]
  --compatible <str>            test node compatible (default ti,omap4-hwspinlock-test)
  --count <n>                   protocol iterations per lock (default 2)
  --params <key=value ...>      module-parameter style settings, e.g. \"count=5\"
  --bank <base>:<blocks>[:<ph>] register bank of <blocks> x 32 locks at global id <base>
  --ref <ph>:<local>            hwlocks reference of the test node
  --level <filter>              log level (off, error, warn, info, debug, trace)";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("missing value for {0}")]
    MissingValue(&'static str),
    #[error("invalid value `{value}` for {flag}")]
    InvalidValue { flag: &'static str, value: String },
    #[error("unknown argument `{0}`")]
    Unknown(String),
    #[error(transparent)]
    Params(#[from] ParamError),
}

/// One emulated spinlock module.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BankSpec {
    pub base_id: u32,
    pub num_blocks: u8,
    pub phandle: Option<u32>,
}

/// One `hwlocks` entry: provider phandle and local lock index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RefSpec {
    pub phandle: u32,
    pub local_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub config: SelftestConfig,
    pub compatible: String,
    pub banks: Vec<BankSpec>,
    pub refs: Vec<RefSpec>,
    pub level: LevelFilter,
    pub help: bool,
}

impl Options {
    /// Parses the arguments following the program name.
    ///
    /// Without any `--bank`, a single bank at id 0 large enough for the
    /// selected variant is assumed.
    ///
    /// # Errors
    /// [`ArgError`] for unknown flags and missing or malformed values.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgError> {
        let mut opts = Self {
            config: SelftestConfig::default(),
            compatible: String::from(DEFAULT_COMPATIBLE),
            banks: Vec::new(),
            refs: Vec::new(),
            level: LevelFilter::Info,
            help: false,
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => opts.help = true,
                "--compatible" => opts.compatible = value(&mut args, "--compatible")?,
                "--count" => {
                    opts.config.count = parse_num("--count", &value(&mut args, "--count")?)?;
                }
                "--params" => {
                    let params = value(&mut args, "--params")?;
                    opts.config = opts.config.apply_params(&params)?;
                }
                "--bank" => opts.banks.push(parse_bank(&value(&mut args, "--bank")?)?),
                "--ref" => opts.refs.push(parse_ref(&value(&mut args, "--ref")?)?),
                "--level" => {
                    let raw = value(&mut args, "--level")?;
                    opts.level = LevelFilter::from_str(&raw).map_err(|_| ArgError::InvalidValue {
                        flag: "--level",
                        value: raw,
                    })?;
                }
                _ => return Err(ArgError::Unknown(arg)),
            }
        }

        if opts.banks.is_empty() {
            opts.banks.push(default_bank(&opts.compatible));
        }
        Ok(opts)
    }
}

fn default_bank(compatible: &str) -> BankSpec {
    let max_locks = variant::lookup(compatible).map_or(LOCKS_PER_BLOCK, |v| v.max_locks);
    let num_blocks = u8::try_from(max_locks.div_ceil(LOCKS_PER_BLOCK)).unwrap_or(u8::MAX);
    BankSpec {
        base_id: 0,
        num_blocks,
        phandle: Some(1),
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<String, ArgError> {
    args.next().ok_or(ArgError::MissingValue(flag))
}

fn parse_num<T: FromStr>(flag: &'static str, raw: &str) -> Result<T, ArgError> {
    raw.parse().map_err(|_| ArgError::InvalidValue {
        flag,
        value: raw.to_string(),
    })
}

fn parse_bank(raw: &str) -> Result<BankSpec, ArgError> {
    let invalid = || ArgError::InvalidValue {
        flag: "--bank",
        value: raw.to_string(),
    };
    let mut parts = raw.split(':');
    let base_id = parts.next().ok_or_else(invalid)?;
    let num_blocks = parts.next().ok_or_else(invalid)?;
    let phandle = parts.next();
    if parts.next().is_some() {
        return Err(invalid());
    }

    let num_blocks: u8 = parse_num("--bank", num_blocks)?;
    if num_blocks == 0 {
        return Err(invalid());
    }
    Ok(BankSpec {
        base_id: parse_num("--bank", base_id)?,
        num_blocks,
        phandle: phandle.map(|p| parse_num("--bank", p)).transpose()?,
    })
}

fn parse_ref(raw: &str) -> Result<RefSpec, ArgError> {
    let (phandle, local_id) = raw.split_once(':').ok_or_else(|| ArgError::InvalidValue {
        flag: "--ref",
        value: raw.to_string(),
    })?;
    Ok(RefSpec {
        phandle: parse_num("--ref", phandle)?,
        local_id: parse_num("--ref", local_id)?,
    })
}
