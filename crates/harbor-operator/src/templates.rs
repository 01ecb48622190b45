//! Component configuration files
//!
//! Pure functions from a [`DerivedConfig`] to the text (or key/value set)
//! mounted into each component. No store access happens here.

use crate::config::DerivedConfig;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Path the registry reads its token-signing certificate bundle from
pub const REGISTRY_ROOT_CERT_PATH: &str = "/etc/registry/root.crt";

/// Registry storage root inside the container
pub const REGISTRY_STORAGE_ROOT: &str = "/storage";

/// Beego settings of the core service
pub const CORE_APP_CONF: &str = "appname = Harbor
runmode = prod
enablegzip = true

[prod]
httpport = 8080
";

#[derive(Serialize)]
struct RegistryConfig {
    version: f32,
    log: RegistryLog,
    storage: RegistryStorage,
    http: RegistryHttp,
    auth: RegistryAuth,
    notifications: RegistryNotifications,
}

#[derive(Serialize)]
struct RegistryLog {
    level: String,
    fields: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct RegistryStorage {
    filesystem: BTreeMap<String, String>,
    cache: BTreeMap<String, String>,
    maintenance: BTreeMap<String, BTreeMap<String, bool>>,
    delete: BTreeMap<String, bool>,
    redirect: BTreeMap<String, bool>,
}

#[derive(Serialize)]
struct RegistryHttp {
    addr: String,
    relativeurls: bool,
}

#[derive(Serialize)]
struct RegistryAuth {
    token: RegistryToken,
}

#[derive(Serialize)]
struct RegistryToken {
    issuer: String,
    realm: String,
    rootcertbundle: String,
    service: String,
}

#[derive(Serialize)]
struct RegistryNotifications {
    endpoints: Vec<RegistryEndpoint>,
}

#[derive(Serialize)]
struct RegistryEndpoint {
    name: String,
    disabled: bool,
    url: String,
    timeout: String,
    threshold: u32,
    backoff: String,
}

/// Registry log levels are a subset of the component levels
fn registry_log_level(level: &str) -> &'static str {
    match level {
        "debug" => "debug",
        "warning" => "warn",
        "error" | "fatal" => "error",
        _ => "info",
    }
}

/// Render the registry's `config.yml`.
///
/// The HTTP secret is not part of the file; the registry takes it from the
/// `REGISTRY_HTTP_SECRET` environment variable.
pub fn registry_config(config: &DerivedConfig) -> Result<String> {
    let topology = &config.topology;
    let rendered = RegistryConfig {
        version: 0.1,
        log: RegistryLog {
            level: registry_log_level(&topology.log_level).to_string(),
            fields: BTreeMap::from([("service".to_string(), "registry".to_string())]),
        },
        storage: RegistryStorage {
            filesystem: BTreeMap::from([(
                "rootdirectory".to_string(),
                REGISTRY_STORAGE_ROOT.to_string(),
            )]),
            cache: BTreeMap::from([("layerinfo".to_string(), "inmemory".to_string())]),
            maintenance: BTreeMap::from([(
                "uploadpurging".to_string(),
                BTreeMap::from([("enabled".to_string(), false)]),
            )]),
            delete: BTreeMap::from([("enabled".to_string(), true)]),
            redirect: BTreeMap::from([("disable".to_string(), true)]),
        },
        http: RegistryHttp {
            addr: ":5000".to_string(),
            relativeurls: false,
        },
        auth: RegistryAuth {
            token: RegistryToken {
                issuer: "harbor-token-issuer".to_string(),
                realm: format!(
                    "{}/service/token",
                    topology.external_url.trim_end_matches('/')
                ),
                rootcertbundle: REGISTRY_ROOT_CERT_PATH.to_string(),
                service: "harbor-registry".to_string(),
            },
        },
        notifications: RegistryNotifications {
            endpoints: vec![RegistryEndpoint {
                name: "harbor".to_string(),
                disabled: false,
                url: format!("{}/service/notifications", topology.core_url),
                timeout: "3000ms".to_string(),
                threshold: 5,
                backoff: "1s".to_string(),
            }],
        },
    };
    Ok(serde_yaml::to_string(&rendered)?)
}

/// Environment of the adminserver, mounted from its config map
pub fn adminserver_env(config: &DerivedConfig) -> BTreeMap<String, String> {
    let topology = &config.topology;
    let database = &topology.database;
    let instance = &config.identity.instance;
    let on_off = |enabled: bool| enabled.to_string();

    BTreeMap::from([
        ("LOG_LEVEL".to_string(), topology.log_level.clone()),
        ("EXT_ENDPOINT".to_string(), topology.external_url.clone()),
        ("AUTH_MODE".to_string(), "db_auth".to_string()),
        ("SELF_REGISTRATION".to_string(), "on".to_string()),
        (
            "PROJECT_CREATION_RESTRICTION".to_string(),
            "everyone".to_string(),
        ),
        ("DATABASE_TYPE".to_string(), "postgresql".to_string()),
        ("POSTGRESQL_HOST".to_string(), database.host.clone()),
        ("POSTGRESQL_PORT".to_string(), database.port.to_string()),
        ("POSTGRESQL_USERNAME".to_string(), database.user.clone()),
        (
            "POSTGRESQL_DATABASE".to_string(),
            database.core_database.clone(),
        ),
        ("POSTGRESQL_SSLMODE".to_string(), database.sslmode.clone()),
        (
            "REGISTRY_URL".to_string(),
            format!("http://{}-registry:5000", instance),
        ),
        (
            "TOKEN_SERVICE_URL".to_string(),
            format!("{}/service/token", topology.core_url),
        ),
        ("CORE_URL".to_string(), topology.core_url.clone()),
        ("JOBSERVICE_URL".to_string(), topology.jobservice_url.clone()),
        ("IMAGE_STORE_PATH".to_string(), "/".to_string()),
        (
            "REGISTRY_STORAGE_PROVIDER_NAME".to_string(),
            topology.storage_type.clone(),
        ),
        ("WITH_CHARTMUSEUM".to_string(), on_off(topology.chart.enabled)),
        ("WITH_CLAIR".to_string(), on_off(topology.clair_enabled)),
        ("WITH_NOTARY".to_string(), on_off(topology.notary_enabled)),
        (
            "CLAIR_DB".to_string(),
            database.clair_database.clone(),
        ),
        ("CFG_EXPIRATION".to_string(), "5".to_string()),
        ("ADMIRAL_URL".to_string(), "NA".to_string()),
        ("RESET".to_string(), "false".to_string()),
    ])
}

#[derive(Serialize)]
struct JobServiceConfig {
    protocol: String,
    port: u16,
    worker_pool: WorkerPool,
    job_loggers: Vec<JobLogger>,
    loggers: Vec<JobLogger>,
}

#[derive(Serialize)]
struct WorkerPool {
    workers: u32,
    backend: String,
    redis_pool: RedisPool,
}

#[derive(Serialize)]
struct RedisPool {
    redis_url: String,
    namespace: String,
}

#[derive(Serialize)]
struct JobLogger {
    name: String,
    level: String,
}

/// Render the job service's `config.yml`
pub fn jobservice_config(config: &DerivedConfig) -> Result<String> {
    let level = config.topology.log_level.to_ascii_uppercase();
    let rendered = JobServiceConfig {
        protocol: "http".to_string(),
        port: 8080,
        worker_pool: WorkerPool {
            workers: 10,
            backend: "redis".to_string(),
            redis_pool: RedisPool {
                redis_url: format!("redis://{}-redis:6379/2", config.identity.instance),
                namespace: "harbor_job_service_namespace".to_string(),
            },
        },
        job_loggers: vec![JobLogger {
            name: "STD_OUTPUT".to_string(),
            level: level.clone(),
        }],
        loggers: vec![JobLogger {
            name: "STD_OUTPUT".to_string(),
            level,
        }],
    };
    Ok(serde_yaml::to_string(&rendered)?)
}
