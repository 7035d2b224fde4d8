use std::path::Path;

use console::Style;
use ramp_core::pipeline::RampFitOutput;

use crate::commands::simulate::SimulateArgs;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    clean: Style,
    hit: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            clean: Style::new().green(),
            hit: Style::new().yellow(),
        }
    }
}

/// Mean slope/err over a class of pixels selected by `select`.
fn class_stats(out: &RampFitOutput, select: impl Fn(usize, usize) -> bool) -> Option<(f32, f32, usize)> {
    let (rows, cols) = out.exposure.slope.dim();
    let mut slope_sum = 0.0f32;
    let mut err_sum = 0.0f32;
    let mut n = 0usize;
    for row in 0..rows {
        for col in 0..cols {
            if select(row, col) {
                slope_sum += out.exposure.slope[[row, col]];
                err_sum += out.exposure.err[[row, col]];
                n += 1;
            }
        }
    }
    if n == 0 {
        None
    } else {
        Some((slope_sum / n as f32, err_sum / n as f32, n))
    }
}

pub fn print_simulation_summary(args: &SimulateArgs, out: &RampFitOutput, cr_hit: &[Vec<bool>]) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Ramp Fit Simulation"));
    println!("  {}", s.title.apply_to("\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}"));
    println!();

    println!("  {}", s.header.apply_to("Input"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Shape"),
        s.value.apply_to(format!(
            "{} x {} x {} x {}",
            args.n_ints, args.n_groups, args.rows, args.cols
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("True flux"),
        s.value.apply_to(format!("{:.2} e-/s", args.flux))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Read noise"),
        s.value.apply_to(format!("{:.2} e-", args.read_noise))
    );
    println!();

    println!("  {}", s.header.apply_to("Recovered rate by pixel class"));
    if let Some((slope, err, n)) = class_stats(out, |row, col| !cr_hit[row][col]) {
        println!(
            "    {:<14}{} ({} px)",
            s.clean.apply_to("clean"),
            s.value.apply_to(format!("{slope:.2} +/- {err:.2} e-/s")),
            n
        );
    }
    if let Some((slope, err, n)) = class_stats(out, |row, col| cr_hit[row][col]) {
        println!(
            "    {:<14}{} ({} px)",
            s.hit.apply_to("cr-hit"),
            s.value.apply_to(format!("{slope:.2} +/- {err:.2} e-/s")),
            n
        );
    }
    println!();

    let flagged = out.exposure.dq.iter().filter(|&&d| d != 0).count();
    println!(
        "  {:<16}{}",
        s.label.apply_to("Flagged pixels"),
        s.value.apply_to(flagged)
    );
    println!();
}

pub fn print_fit_summary(source: &Path, out: &RampFitOutput) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Ramp Fit"));
    println!("  {}", s.title.apply_to("\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}"));
    println!();

    println!(
        "  {:<16}{}",
        s.label.apply_to("Source"),
        s.value.apply_to(source.display())
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Integrations"),
        s.value.apply_to(out.integrations.len())
    );

    let (rows, cols) = out.exposure.slope.dim();
    let n = (rows * cols).max(1) as f32;
    let mean_slope: f32 = out.exposure.slope.iter().sum::<f32>() / n;
    let mean_err: f32 = out.exposure.err.iter().sum::<f32>() / n;
    let flagged = out.exposure.dq.iter().filter(|&&d| d != 0).count();

    println!(
        "  {:<16}{}",
        s.label.apply_to("Mean slope"),
        s.value.apply_to(format!("{mean_slope:.3} e-/s"))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Mean err"),
        s.value.apply_to(format!("{mean_err:.3} e-/s"))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Flagged pixels"),
        s.value.apply_to(flagged)
    );
    println!();
}
