use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "resultpush",
    version,
    about = "Push JUnit test results to a test management server",
    after_help = "Server and credentials may also come from a YAML configuration file (--config-file, default ./resultpush.yaml)."
)]
pub struct Cli {
    /// JUnit report files (or ingestion XML files with --internal)
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Supplied XML files are already in the ingestion XML format
    #[arg(short = 'i', long)]
    pub internal: bool,

    /// Skip invalid test runs on the server side
    #[arg(short = 'e', long)]
    pub skip_errors: bool,

    /// Write the ingestion XML to FILE instead of pushing it
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Configuration file location
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(long)]
    pub verbose: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub proxy: ProxyArgs,

    /// Check the ingestion status after each push
    #[arg(long)]
    pub check_result: bool,

    /// Timeout in seconds for the status check (default: 10)
    #[arg(long, value_name = "SEC", value_parser = clap::value_parser!(u32).range(1..))]
    pub check_result_timeout: Option<u32>,

    #[command(flatten)]
    pub metadata: MetadataArgs,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Server URL with protocol and port
    #[arg(short = 's', long, value_name = "URL:PORT", env = "RESULTPUSH_SERVER")]
    pub server: Option<String>,

    /// Shared space to push to
    #[arg(short = 'd', long, value_name = "ID")]
    pub shared_space: Option<u64>,

    /// Workspace to push to
    #[arg(short = 'w', long, value_name = "ID")]
    pub workspace: Option<u64>,

    /// Server username
    #[arg(short = 'u', long, value_name = "USERNAME", env = "RESULTPUSH_USER")]
    pub user: Option<String>,

    /// Server password
    #[arg(
        short = 'p',
        long,
        value_name = "PASSWORD",
        env = "RESULTPUSH_PASSWORD",
        hide_env_values = true,
        conflicts_with = "password_file"
    )]
    pub password: Option<String>,

    /// File holding the server password
    #[arg(long, value_name = "FILE")]
    pub password_file: Option<PathBuf>,

    /// IDP access token, exchanged for a session token
    #[arg(
        long,
        value_name = "TOKEN",
        env = "RESULTPUSH_ACCESS_TOKEN",
        hide_env_values = true
    )]
    pub access_token: Option<String>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ProxyArgs {
    /// Proxy host
    #[arg(long, value_name = "HOSTNAME")]
    pub proxy_host: Option<String>,

    /// Proxy port
    #[arg(long, value_name = "PORT")]
    pub proxy_port: Option<u16>,

    /// Proxy username
    #[arg(long, value_name = "USERNAME")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, value_name = "PASSWORD", conflicts_with = "proxy_password_file")]
    pub proxy_password: Option<String>,

    /// File holding the proxy password
    #[arg(long, value_name = "FILE")]
    pub proxy_password_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct MetadataArgs {
    /// Environment tag for the test runs (repeatable)
    #[arg(short = 't', long = "tag", value_name = "TYPE:VALUE")]
    pub tags: Vec<String>,

    /// Field tag for the test result, e.g. Test_Level:Unit Test (repeatable)
    #[arg(short = 'f', long = "field", value_name = "TYPE:VALUE")]
    pub fields: Vec<String>,

    /// Release to assign the test result to
    #[arg(short = 'r', long, value_name = "ID", conflicts_with = "release_default")]
    pub release: Option<u64>,

    /// Assign the test result to the default release
    #[arg(long)]
    pub release_default: bool,

    /// Program to assign the test result to
    #[arg(long, value_name = "ID")]
    pub program: Option<u64>,

    /// Milestone to assign the test result to
    #[arg(short = 'm', long, value_name = "ID")]
    pub milestone: Option<u64>,

    /// Product area to assign the test result to (repeatable)
    #[arg(short = 'a', long = "product-area", value_name = "ID")]
    pub product_areas: Vec<u64>,

    /// Backlog item to assign the test result to (repeatable)
    #[arg(short = 'b', long = "backlog-item", value_name = "ID")]
    pub backlog_items: Vec<u64>,

    /// Start time of the tests in epoch milliseconds
    #[arg(long, value_name = "TIMESTAMP")]
    pub started: Option<i64>,

    /// Suite to assign the test result to
    #[arg(long, value_name = "ID")]
    pub suite: Option<u64>,

    /// Name of the suite run aggregating the test results
    #[arg(long, value_name = "NAME", requires = "suite")]
    pub suite_external_run_id: Option<String>,

    /// CI server instance id of the build context
    #[arg(long, value_name = "ID")]
    pub build_context_server_id: Option<String>,

    /// Job id of the build context
    #[arg(long, value_name = "ID")]
    pub build_context_job_id: Option<String>,

    /// Build id of the build context
    #[arg(long, value_name = "ID")]
    pub build_context_build_id: Option<String>,
}
