use all_contacts_rs::{run, ContactConfig, RunConfig, DEFAULT_CUTOFF};
use clap::{CommandFactory, Parser};
use env_logger::Env;
use std::path::PathBuf;

const FULL_HELP: &str = "
Tracks every residue-residue contact of a selection through one or more
trajectories.

The selection is split into residues in order of first appearance. For each
frame, two residues are in contact when any atom of one lies within --cutoff
of any atom of the other. The fraction of frames in contact is computed per
trajectory and then averaged (unweighted) over trajectories.

--no_hydrogens removes hydrogens from the system before the selection is
applied. --no_backbone removes backbone atoms (N, CA, C, O, OXT) from each
residue after the split, so a glycine stays in the matrix even when nothing
is left of it.

out_file receives the averaged R x R matrix. With more than one trajectory,
each trajectory's own matrix is also written to <trajectory name>.dat in the
current directory. Every file starts with the command line as a '#' header.

Trajectories may be multi-model PDB (.pdb, .ent) or XYZ (.xyz, with an
optional extended-XYZ Lattice). Orthorhombic cells are used for minimum-image
distances. Set RUST_LOG=debug for more detail.

Example:
    all-contacts model.pdb 'protein and not hydrogen' contacts.dat run1.pdb run2.pdb
";

/// Track residue-residue contacts through MD trajectories
#[derive(Parser)]
#[command(name = "all-contacts")]
#[command(about = "Track residue-residue contacts", long_about = None)]
struct Cli {
    /// File describing the system
    system_file: PathBuf,

    /// Selection string describing which residues to use
    selection: String,

    /// File with the average contact occupancies
    out_file: PathBuf,

    /// Trajectory files (multi-model PDB or XYZ)
    #[arg(required = true, num_args = 1..)]
    traj_files: Vec<PathBuf>,

    /// Cutoff distance for contact
    #[arg(long, default_value_t = DEFAULT_CUTOFF)]
    cutoff: f64,

    /// Don't include hydrogens
    #[arg(long = "no_hydrogens")]
    no_hydrogens: bool,

    /// Don't include the backbone
    #[arg(long = "no_backbone")]
    no_backbone: bool,

    /// Print detailed description of all options
    #[arg(long)]
    fullhelp: bool,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    // Handled before parsing so it works without the required arguments
    if args.iter().skip(1).any(|a| a == "--fullhelp") {
        println!("{}", FULL_HELP);
        if let Err(e) = Cli::command().print_help() {
            eprintln!("❌ Error printing help: {}", e);
            std::process::exit(1);
        }
        std::process::exit(0);
    }
    let header = args.join(" ");
    let cli = Cli::parse();

    println!("System: {:?}", cli.system_file);
    println!("Selection: {}", cli.selection);
    println!("Cutoff distance: {}", cli.cutoff);

    let config = RunConfig::new(cli.system_file, cli.selection, cli.out_file, cli.traj_files)
        .with_contact(ContactConfig {
            cutoff: cli.cutoff,
            exclude_hydrogens: cli.no_hydrogens,
            exclude_backbone: cli.no_backbone,
        })
        .with_header(header)
        .with_progress(true);

    match run(&config) {
        Ok(report) => {
            println!(
                "✅ {} residues tracked over {} trajectories",
                report.residues.len(),
                report.per_trajectory.len()
            );
            for result in &report.per_trajectory {
                match &result.output {
                    Some(path) => println!(
                        "📄 {:?}: {} frames, saved to {:?}",
                        result.path, result.frames, path
                    ),
                    None => println!("   {:?}: {} frames", result.path, result.frames),
                }
            }
            println!("📄 Average contacts saved to: {:?}", report.out_file);
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}
