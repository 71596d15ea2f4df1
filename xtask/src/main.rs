use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use catalog_infra::api::compute_unit_assets;
use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the album catalog workspace",
    long_about = "Synthesizes, packages and deploys the album catalog stacks,\n\
                  and runs the CI checks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize CloudFormation templates into the output directory
    Synth {
        #[command(flatten)]
        assembly: AssemblyArgs,
    },
    /// Build the Lambda binaries and zip them next to the templates
    Package {
        #[command(flatten)]
        assembly: AssemblyArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Synthesize, package and deploy stacks in the given order
    Deploy {
        /// Stacks to deploy, in deployment order
        #[arg(required = true)]
        stacks: Vec<String>,
        /// `never` executes change sets right away; anything else leaves
        /// them for review
        #[arg(long, value_enum, default_value_t = Approval::Broadening)]
        require_approval: Approval,
        /// Bucket receiving packaged assets
        #[arg(long, env = "ASSET_BUCKET")]
        asset_bucket: String,
        /// Deploy the templates already in the output directory
        #[arg(long)]
        skip_build: bool,
        #[command(flatten)]
        assembly: AssemblyArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(clap::Args)]
struct AssemblyArgs {
    /// Output directory for templates and assets
    #[arg(long, default_value = "cdk.out")]
    out: PathBuf,
    /// Target region, also used for the deploy commands
    #[arg(long, env = "AWS_REGIONS")]
    region: Option<String>,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Compilation target triple for Lambda binaries
    #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
    target: String,
    /// Build profile used for binaries
    #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
    profile: BuildProfile,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Approval {
    Never,
    AnyChange,
    Broadening,
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting and clippy
    Check,
    /// Unit and integration tests
    Test,
    /// Run check + test
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn run(program: &str, args: &[&str]) {
    eprintln!("+ {program} {}", args.join(" "));
    let status: ExitStatus = Command::new(program)
        .args(args)
        .status()
        .unwrap_or_else(|error| panic!("failed to execute {program}: {error}"));
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_cargo(args: &[&str]) {
    run("cargo", args);
}

fn run_aws(args: &[&str]) {
    run("aws", args);
}

fn template_path(out: &Path, stack: &str) -> PathBuf {
    out.join(format!("{stack}.template.json"))
}

fn packaged_template_path(out: &Path, stack: &str) -> PathBuf {
    out.join(format!("{stack}.packaged.json"))
}

// ── synth / package / deploy ───────────────────────────────────────

fn synth(assembly: &AssemblyArgs) {
    step("Synthesize templates");
    let out = assembly.out.display().to_string();
    let mut args = vec![
        "run",
        "-p",
        "catalog_infra",
        "--bin",
        "synth",
        "--",
        "--out",
        out.as_str(),
    ];
    if let Some(region) = &assembly.region {
        args.extend(["--region", region.as_str()]);
    }
    run_cargo(&args);
}

fn package_lambdas(assembly: &AssemblyArgs, build: &BuildArgs) {
    ensure_rust_target_installed(&build.target);

    step("Build lambda binaries");
    let binaries: Vec<&str> = compute_unit_assets().collect();
    let mut cargo_args = vec!["build", "-p", "catalog_api", "--target", build.target.as_str()];
    for &binary in &binaries {
        cargo_args.extend(["--bin", binary]);
    }
    if let Some(flag) = build.profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Package lambda zip artifacts");
    let target_dir = Path::new("target")
        .join(&build.target)
        .join(build.profile.dir_name());
    let assets_dir = assembly.out.join("assets");
    fs::create_dir_all(&assets_dir).expect("failed to create assets directory");

    let mut packaged = Vec::with_capacity(binaries.len());
    for binary in binaries {
        let zip_path = assets_dir.join(format!("{binary}.zip"));
        package_lambda_zip(&target_dir.join(binary), &zip_path);
        packaged.push(zip_path);
    }

    eprintln!("\nPackaged artifacts:");
    for path in packaged {
        eprintln!("- {}", path.display());
    }
}

fn deploy(stacks: &[String], approval: Approval, asset_bucket: &str, assembly: &AssemblyArgs) {
    let out = &assembly.out;
    for stack in stacks {
        let template = template_path(out, stack);
        if !template.exists() {
            panic!(
                "no template for stack `{stack}` at '{}'; run `cargo xtask synth` first",
                template.display()
            );
        }
        let template = template.display().to_string();
        let packaged = packaged_template_path(out, stack).display().to_string();

        step(&format!("Package {stack}"));
        let mut package_args = vec![
            "cloudformation",
            "package",
            "--template-file",
            template.as_str(),
            "--s3-bucket",
            asset_bucket,
            "--output-template-file",
            packaged.as_str(),
        ];
        if let Some(region) = &assembly.region {
            package_args.extend(["--region", region.as_str()]);
        }
        run_aws(&package_args);

        step(&format!("Deploy {stack}"));
        let mut deploy_args = vec![
            "cloudformation",
            "deploy",
            "--template-file",
            packaged.as_str(),
            "--stack-name",
            stack.as_str(),
            "--capabilities",
            "CAPABILITY_IAM",
            "CAPABILITY_NAMED_IAM",
            "--no-fail-on-empty-changeset",
        ];
        if approval != Approval::Never {
            deploy_args.push("--no-execute-changeset");
        }
        if let Some(region) = &assembly.region {
            deploy_args.extend(["--region", region.as_str()]);
        }
        run_aws(&deploy_args);
    }

    if approval != Approval::Never {
        eprintln!(
            "\nChange sets were created but not executed; review and execute them to finish."
        );
    }
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if output.status.success() && !installed.lines().any(|line| line.trim() == target) {
        panic!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo xtask package`"
        );
    }
}

fn package_lambda_zip(binary_path: &Path, zip_path: &Path) {
    if !binary_path.exists() {
        panic!("expected lambda binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path).expect("failed to read lambda binary");
    let file = fs::File::create(zip_path).expect("failed to create lambda zip");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .expect("failed to start bootstrap entry in lambda zip");
    zip.write_all(&binary)
        .expect("failed to write bootstrap entry");
    zip.finish().expect("failed to finish lambda zip");
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&["clippy", "--all-targets", "--", "-D", "warnings"]);
}

fn ci_test() {
    step("Test catalog_infra");
    run_cargo(&["test", "-p", "catalog_infra"]);

    step("Test catalog_api");
    run_cargo(&["test", "-p", "catalog_api"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { assembly } => synth(&assembly),
        Commands::Package { assembly, build } => package_lambdas(&assembly, &build),
        Commands::Deploy {
            stacks,
            require_approval,
            asset_bucket,
            skip_build,
            assembly,
            build,
        } => {
            if !skip_build {
                synth(&assembly);
                package_lambdas(&assembly, &build);
            }
            deploy(&stacks, require_approval, &asset_bucket, &assembly);
            eprintln!("\nDeployed: {}", stacks.join(", "));
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Test => ci_test(),
                CiJob::All => {
                    ci_check();
                    ci_test();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
