//! Configuration for the `capi-e2e` command line.
//!
//! Build a [`Config`] by hand, or turn on the "cli" feature and use
//! [`Config::new_from_flags`].
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "cli")]
use structopt::StructOpt;

const DEFAULT_NAMESPACE: &str = "default";

/// What the command line was asked to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Create the cluster described by a manifest file and wait for it.
    Provision {
        /// The multi-document YAML file describing the cluster.
        manifests: PathBuf,
        /// Tear the cluster down again once it came up.
        teardown: bool,
    },
    /// Delete an existing cluster and wait for its objects to disappear.
    Teardown {
        /// Name of the cluster, looked up in the configured namespace.
        cluster: String,
    },
}

/// The configuration of a `capi-e2e` run.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Namespace for objects whose manifest does not name one
    pub namespace: String,
    /// How long to wait for each provisioning step. Zero picks the default.
    pub create_timeout: Duration,
    /// How long to wait for teardown. Zero picks the default.
    pub delete_timeout: Duration,
    /// What to do.
    pub action: Action,
}

impl Config {
    /// A config for `action` with the default namespace and timeouts.
    pub fn new(action: Action) -> Self {
        Config {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            create_timeout: Duration::from_secs(0),
            delete_timeout: Duration::from_secs(0),
            action,
        }
    }

    /// Parses all command line flags and sets the proper defaults. The version
    /// of your application should be passed to set the proper version for the CLI
    #[cfg(any(feature = "cli", feature = "docs"))]
    #[cfg_attr(feature = "docs", doc(cfg(feature = "cli")))]
    pub fn new_from_flags(version: &str) -> Self {
        let app = Opts::clap().version(version);
        let opts = Opts::from_clap(&app.get_matches());
        opts.into()
    }
}

/// CLI options that can be configured for `capi-e2e`
#[derive(StructOpt, Clone, Debug)]
#[cfg(any(feature = "cli", feature = "docs"))]
#[cfg_attr(feature = "docs", doc(cfg(feature = "cli")))]
#[structopt(
    name = "capi-e2e",
    about = "Provision and tear down Cluster API clusters for end-to-end tests"
)]
pub struct Opts {
    #[structopt(
        short = "n",
        long = "namespace",
        default_value = DEFAULT_NAMESPACE,
        env = "CAPI_E2E_NAMESPACE",
        help = "The namespace for objects that do not specify one"
    )]
    namespace: String,

    #[structopt(
        long = "create-timeout",
        default_value = "0",
        env = "CAPI_E2E_CREATE_TIMEOUT",
        help = "Seconds to wait for each provisioning step. 0 waits 10 minutes"
    )]
    create_timeout: u64,

    #[structopt(
        long = "delete-timeout",
        default_value = "0",
        env = "CAPI_E2E_DELETE_TIMEOUT",
        help = "Seconds to wait for the cluster and its objects to be deleted. 0 waits 5 minutes"
    )]
    delete_timeout: u64,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Clone, Debug)]
#[cfg(any(feature = "cli", feature = "docs"))]
enum Command {
    /// Create a cluster from a manifest file and wait until it is up
    Provision {
        #[structopt(
            short = "f",
            long = "manifests",
            env = "CAPI_E2E_MANIFESTS",
            parse(from_os_str),
            help = "Multi-document YAML file holding the cluster's objects"
        )]
        manifests: PathBuf,

        #[structopt(long = "teardown", help = "Delete the cluster again after it came up")]
        teardown: bool,
    },
    /// Delete a cluster and wait until everything it owned is gone
    Teardown {
        #[structopt(help = "Name of the cluster to delete")]
        cluster: String,
    },
}

#[cfg(any(feature = "cli", feature = "docs"))]
impl From<Opts> for Config {
    fn from(opts: Opts) -> Self {
        let action = match opts.command {
            Command::Provision {
                manifests,
                teardown,
            } => Action::Provision {
                manifests,
                teardown,
            },
            Command::Teardown { cluster } => Action::Teardown { cluster },
        };
        Config {
            namespace: opts.namespace,
            create_timeout: Duration::from_secs(opts.create_timeout),
            delete_timeout: Duration::from_secs(opts.delete_timeout),
            action,
        }
    }
}
