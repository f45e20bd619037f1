//! `failsight score`: merge sweep reports and pick k.

use std::path::PathBuf;

use failsight_core::{ConfusionSweep, KMetrics, read_report};

use super::{fail, fmt_opt};

pub fn run(reports: &[PathBuf], k: Option<usize>, all: bool) {
    let mut merged: Option<ConfusionSweep> = None;
    for path in reports {
        let sweep = read_report(path).unwrap_or_else(|e| fail("failed to read report", e));
        match merged.as_mut() {
            None => merged = Some(sweep),
            Some(m) => m
                .merge(&sweep)
                .unwrap_or_else(|e| fail(&format!("cannot merge {}", path.display()), e)),
        }
    }
    let Some(merged) = merged else {
        fail("score", "no reports given");
    };

    println!(
        "{} report(s), {} batch(es), {} samples, k=1..{}",
        reports.len(),
        merged.ranges().len(),
        merged.covered(),
        merged.k_range()
    );

    if let Some(k) = k {
        let Some(m) = merged.metrics(k) else {
            fail("score", format!("k={k} is outside 1..={}", merged.k_range()));
        };
        print_header();
        print_row(&merged, &m);
        return;
    }

    if all {
        print_header();
        for m in merged.all_metrics() {
            print_row(&merged, &m);
        }
        println!();
    }

    let best = merged.best();
    for (name, entry) in [
        ("accuracy", best.accuracy),
        ("precision", best.precision),
        ("recall", best.recall),
        ("F1", best.f1),
    ] {
        match entry {
            Some((k, v)) => println!("Best k for {name} was {k} with {v:.4}"),
            None => println!("Best k for {name}: undefined at every k"),
        }
    }
    println!("Per {} total samples", merged.covered());
}

fn print_header() {
    println!(
        "{:>4} {:>7} {:>7} {:>7} {:>7} {:>9} {:>9} {:>9} {:>9}",
        "k", "TP", "TN", "FP", "FN", "accuracy", "precision", "recall", "F1"
    );
    println!("{}", "-".repeat(77));
}

fn print_row(sweep: &ConfusionSweep, m: &KMetrics) {
    let c = sweep.confusion(m.k).unwrap_or_default();
    println!(
        "{:>4} {:>7} {:>7} {:>7} {:>7} {:>9} {:>9} {:>9} {:>9}",
        m.k,
        c.true_pos,
        c.true_neg,
        c.false_pos,
        c.false_neg,
        fmt_opt(m.accuracy),
        fmt_opt(m.precision),
        fmt_opt(m.recall),
        fmt_opt(m.f1)
    );
}
