mod args;
mod logger;

use crate::args::{BankSpec, Options, USAGE};
use crate::logger::StderrLogger;
use kernel_hwspinlock::of::{
    BASE_ID_PROPERTY, COMPATIBLE_PROPERTY, DeviceNode, DeviceTree, HWLOCK_CELLS_PROPERTY,
    HWLOCKS_PROPERTY, NUM_LOCKS_PROPERTY,
};
use kernel_hwspinlock::{
    HwSpinlockDevice, HwSpinlockError, HwSpinlockRegistry, RegisterFile, RegisterFileOps,
};
use kernel_hwspinlock_selftest::{Selftest, SelftestError, SelftestReport};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
enum ToolError {
    #[error("unable to register bank: {0}")]
    Bank(#[from] HwSpinlockError),
    #[error(transparent)]
    Selftest(#[from] SelftestError),
}

fn main() -> ExitCode {
    // args: [--count n] [--bank base:blocks[:phandle]]... [--ref phandle:local]...
    let opts = match Options::parse(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    if opts.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = StderrLogger::new(opts.level).init() {
        eprintln!("unable to install logger: {e}");
    }

    match run(&opts) {
        Ok(report) => {
            println!("{report}");
            if report.is_pass() {
                println!("PASS");
                ExitCode::SUCCESS
            } else {
                println!(
                    "FAIL: {} failures on locks {:?}",
                    report.failure_count(),
                    report.failing_ids()
                );
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(opts: &Options) -> Result<SelftestReport, ToolError> {
    let (registry, tree) = attach_banks(&opts.banks)?;

    let mut node =
        DeviceNode::new("hwspinlock-test").with_string(COMPATIBLE_PROPERTY, &opts.compatible);
    if !opts.refs.is_empty() {
        let cells: Vec<u32> = opts
            .refs
            .iter()
            .flat_map(|r| [r.phandle, r.local_id])
            .collect();
        node = node.with_cells(HWLOCKS_PROPERTY, &cells);
    }

    Ok(Selftest::new(&registry, opts.config).run(&tree, &node)?)
}

/// Registers one emulated spinlock module per bank and describes each of them
/// in the device tree.
fn attach_banks(banks: &[BankSpec]) -> Result<(HwSpinlockRegistry, DeviceTree), HwSpinlockError> {
    let mut registry = HwSpinlockRegistry::new();
    let mut tree = DeviceTree::new();

    for spec in banks {
        let ops = Arc::new(RegisterFileOps::new(Arc::new(RegisterFile::new(
            spec.num_blocks,
        ))));
        let device = HwSpinlockDevice::from_regfile(ops, spec.base_id)?;

        let mut node = DeviceNode::new(format!("spinlock@{}", spec.base_id))
            .with_u32(BASE_ID_PROPERTY, device.base_id())
            .with_u32(NUM_LOCKS_PROPERTY, device.num_locks())
            .with_u32(HWLOCK_CELLS_PROPERTY, 1);
        if let Some(phandle) = spec.phandle {
            node = node.with_phandle(phandle);
        }

        log::info!(
            "attached {} with {} locks at id {}",
            node.name(),
            device.num_locks(),
            device.base_id()
        );
        tree.add(node);
        registry.register(device, spec.phandle)?;
    }

    Ok((registry, tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(args: &[&str]) -> Options {
        Options::parse(args.iter().map(ToString::to_string)).unwrap()
    }

    #[test]
    fn default_run_passes() {
        let report = run(&options(&[])).unwrap();
        assert!(report.is_pass());
        assert_eq!(report.sweep.tested.len(), 32);
    }

    #[test]
    fn references_are_resolved_across_banks() {
        let opts = options(&[
            "--compatible",
            "ti,am33xx-hwspinlock-test",
            "--bank",
            "0:2:1",
            "--bank",
            "64:2:2",
            "--ref",
            "1:5",
            "--ref",
            "2:3",
        ]);
        let report = run(&opts).unwrap();
        assert_eq!(report.references.tested, [5, 67]);
        assert_eq!(report.sweep.tested.len(), 128);
        assert!(report.is_pass());
    }

    #[test]
    fn gaps_in_the_id_space_fail_the_sweep() {
        let opts = options(&["--bank", "0:1:1", "--compatible", "ti,am43xx-hwspinlock-test"]);
        let report = run(&opts).unwrap();
        assert_eq!(report.failure_count(), 96);
        assert_eq!(report.failing_ids().first(), Some(&32));
    }

    #[test]
    fn overlapping_banks_are_rejected() {
        let opts = options(&["--bank", "0:1", "--bank", "16:1"]);
        assert!(matches!(
            run(&opts),
            Err(ToolError::Bank(HwSpinlockError::Overlap { base: 16, end: 48 }))
        ));
    }

    #[test]
    fn unknown_variant_is_an_error() {
        let opts = options(&["--compatible", "acme,lock"]);
        assert!(matches!(
            run(&opts),
            Err(ToolError::Selftest(SelftestError::UnknownVariant(_)))
        ));
    }
}
