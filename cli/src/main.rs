use clap::{CommandFactory, Parser};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::process;
use std::sync::Arc;

use paramsift_core::{
    read_lines, ConsoleSink, Finding, ParamTarget, ScanConfig, ScanEventSink, ScanSummary, Scanner,
};

#[derive(Parser, Debug)]
#[command(
    name = "paramsift",
    version,
    about = "Parameter injection auditor with AI-assisted remediation",
    override_usage = "paramsift <target>  <options>",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Quick scan:                     paramsift \"http://target.com/page.php?id=1\"
  Verbose mode:                   paramsift \"http://target.com/page.php?id=1\" -v
  Parallel parameters:            paramsift \"http://target.com/search?q=a&cat=2\" -t 4
  With proxy (Burp):              paramsift \"http://target.com/?id=1\" --proxy http://127.0.0.1:8080
  Custom headers:                 paramsift \"http://target.com/?id=1\" -H \"Cookie: sess=abc\"
  Offline remedies:               paramsift \"http://target.com/?id=1\" --no-ai
  Scan from file:                 paramsift -l targets.txt --json results.json
  Dry-run test:                   paramsift \"http://target.com/?id=1\" --dry-run"
)]
pub struct Args {
    #[arg(required_unless_present = "list")]
    pub target: Option<String>,

    #[arg(short = 'l', long = "list", help = "File containing target URLs (one per line)")]
    pub list: Option<String>,

    #[arg(short = 't', long, default_value_t = 1, help = "Parameters probed in parallel per module")]
    pub threads: usize,

    #[arg(long, default_value_t = 7, help = "Probe timeout in seconds")]
    pub timeout: u64,

    #[arg(short = 'o', long, default_value = "reports/security_audit_report.csv", help = "CSV findings table, reset on every run")]
    pub output: String,

    #[arg(long = "json", help = "Write the scan summaries as JSON to this file")]
    pub json: Option<String>,

    #[arg(long, help = "Proxy URL (e.g. http://127.0.0.1:8080)")]
    pub proxy: Option<String>,

    #[arg(short = 'H', long = "header", help = "Custom header (e.g. \"Authorization: Bearer TOKEN\")")]
    pub headers: Vec<String>,

    #[arg(long, help = "JSON signature catalog replacing the built-in modules")]
    pub catalog: Option<String>,

    #[arg(long, help = "Gemini model used for remediation advice")]
    pub model: Option<String>,

    #[arg(long, default_value_t = false, help = "Skip the AI generator and use the static remedy")]
    pub no_ai: bool,

    #[arg(long, default_value_t = false, help = "Skip the server fingerprint request")]
    pub no_fingerprint: bool,

    #[arg(long, default_value_t = 1500, help = "Delay before each remedy generation, in milliseconds")]
    pub pacing_ms: u64,

    #[arg(short = 'v', long, default_value_t = false, help = "Show the whole process (Verbose Mode)")]
    pub verbose: bool,

    #[arg(long, help = "Validate targets without sending requests")]
    pub dry_run: bool,
}

impl Args {
    fn to_config(&self) -> ScanConfig {
        let defaults = ScanConfig::default();
        ScanConfig {
            threads: self.threads,
            timeout: self.timeout,
            output: self.output.clone(),
            json_output: self.json.clone().unwrap_or_default(),
            proxy: self.proxy.clone().unwrap_or_default(),
            headers: self.headers.join("\n"),
            catalog: self.catalog.clone().unwrap_or_default(),
            ai_remedies: !self.no_ai,
            gemini_model: self.model.clone().unwrap_or(defaults.gemini_model),
            remedy_pacing_ms: self.pacing_ms,
            fingerprint: !self.no_fingerprint,
            verbose: self.verbose,
            ..defaults
        }
    }
}

/// Console output with a module progress bar drawn underneath it.
struct ProgressSink {
    console: ConsoleSink,
    bar: ProgressBar,
}

impl ProgressSink {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { console: ConsoleSink, bar }
    }

    fn reset(&self) {
        self.bar.reset();
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScanEventSink for ProgressSink {
    fn on_log(&self, level: &str, message: &str) {
        self.bar.suspend(|| self.console.on_log(level, message));
    }

    fn on_finding(&self, finding: &Finding) {
        self.bar.suspend(|| self.console.on_finding(finding));
    }

    fn on_progress(&self, phase: &str, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
        self.bar.set_message(phase.to_string());
    }
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();
    init_logger(args.verbose);
    print_banner();

    let targets = collect_targets(&args);
    if targets.is_empty() {
        eprint!("{}\r\n", "[!] No targets specified. Provide a URL or use -l <file>.".red());
        let mut cmd = Args::command();
        cmd.print_help().ok();
        process::exit(1);
    }

    if args.dry_run {
        for target in &targets {
            dry_run(target);
        }
        return;
    }

    let config = args.to_config();
    let progress = Arc::new(ProgressSink::new());
    let scanner = match Scanner::from_config(&config, progress.clone()) {
        Ok(scanner) => scanner,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {:#}", e).red());
            process::exit(1);
        }
    };

    print_scan_config(&config, &scanner);

    let total = targets.len();
    let mut summaries = Vec::with_capacity(total);
    for (i, target) in targets.iter().enumerate() {
        if total > 1 {
            print!(
                "\r\n{}\r\n",
                format!("━━━ Target {}/{}: {} ━━━", i + 1, total, target)
                    .bright_white().bold()
            );
            std::io::stdout().flush().ok();
        }
        progress.reset();
        let summary = scanner.scan(target).await;
        progress.finish();
        print_summary(&summary);
        summaries.push(summary);
    }

    if let Some(path) = config.json_output_ref() {
        if let Err(e) = write_json(path, &summaries) {
            eprint!("{}\r\n", format!("[!] Failed to write '{}': {}", path, e).red());
            process::exit(1);
        }
        print!("{}\r\n", format!("[+] Summary written to {}", path).green());
    }

    if summaries.iter().any(|s| !s.is_success()) {
        process::exit(1);
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Targets from `-l` first, then the positional one; duplicates dropped.
fn collect_targets(args: &Args) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();

    if let Some(ref list_path) = args.list {
        match read_lines(list_path) {
            Ok(lines) => {
                print!(
                    "{}\r\n",
                    format!("[+] Loaded {} target(s) from {}", lines.len(), list_path)
                        .green().bold()
                );
                std::io::stdout().flush().ok();
                targets.extend(lines);
            }
            Err(e) => {
                eprint!("{}\r\n", format!("[!] Failed to read '{}': {}", list_path, e).red());
                process::exit(1);
            }
        }
    }

    if let Some(ref t) = args.target {
        targets.push(t.trim().to_string());
    }

    let mut seen = HashSet::new();
    targets.retain(|t| !t.is_empty() && seen.insert(t.clone()));
    targets
}

fn dry_run(target: &str) {
    println!("[DRY RUN] Would scan target: {}", target);
    match ParamTarget::parse(target) {
        Ok(parsed) => println!(
            "[DRY RUN]   injectable parameters: {}",
            parsed.injection_points().len()
        ),
        Err(e) => println!("[DRY RUN]   skipped: {}", e),
    }
}

fn write_json(path: &str, summaries: &[ScanSummary]) -> anyhow::Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, summaries)?;
    Ok(())
}

fn print_banner() {
    let banner = r#"
   ___  ___ ________ ___ _  ___ ___ ___ ________
  / _ \/ _ |/ _ \/ _ |/  |/  / __/  _/ __/_  __/
 / ___/ __ / , _/ __ / /|_/ /\ \_/ // _/  / /
/_/  /_/ |_/_/|_/_/ |_/_/  /_/___/___/_/   /_/
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

fn print_scan_config(config: &ScanConfig, scanner: &Scanner) {
    let on_off = |b: bool| if b { "ON" } else { "OFF" };

    print!("{}\r\n", format!("[+] Modules:     {} ({} payloads)", scanner.catalog().modules().len(), scanner.catalog().payload_count()).green().bold());
    print!("{}\r\n", format!("[+] Threads:     {}", config.threads).blue());
    print!("{}\r\n", format!("[+] Timeout:     {}s", config.timeout).blue());
    print!("{}\r\n", format!("[+] AI remedies: {}", on_off(config.ai_remedies)).magenta().bold());
    print!("{}\r\n", format!("[+] Verbose:     {}", on_off(config.verbose)).magenta());
    if let Some(output) = config.output_ref() {
        print!("{}\r\n", format!("[+] Output:      {}", output).blue());
    }
    if let Some(proxy) = config.proxy_ref() {
        print!("{}\r\n", format!("[+] Proxy:       {}", proxy).yellow());
    }
    let headers = config.parsed_headers();
    if !headers.is_empty() {
        print!("{}\r\n", format!("[+] Headers:     {} custom", headers.len()).yellow());
    }
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

fn print_summary(summary: &ScanSummary) {
    print!("\r\n{}\r\n", "══════════════════ SCAN SUMMARY ══════════════════".bright_white().bold());
    if !summary.is_success() {
        let kind = summary.error_kind.map(|k| format!("{:?}", k)).unwrap_or_default();
        print!(
            "{}\r\n",
            format!("[!] {} ({}): {}", kind, summary.http_status(), summary.message.as_deref().unwrap_or("")).red().bold()
        );
    } else if summary.findings.is_empty() {
        print!("{}\r\n", "[+] No vulnerabilities detected.".green().bold());
    } else {
        for finding in &summary.findings {
            let severity = finding.severity_profile.severity;
            let label = format!("[{}]", severity);
            let label = if severity.is_urgent() { label.red().bold() } else { label.yellow() };
            print!("  {} {:<5} {} -> {}\r\n", label, finding.type_id, finding.parameter_name, finding.proof_url);
        }
        print!("{}\r\n", format!("[+] {} finding(s)", summary.finding_count).green().bold());
    }
    if let Some(ref path) = summary.report_path {
        print!("{}\r\n", format!("[+] Report table: {}", path).blue());
    }
    std::io::stdout().flush().ok();
}
