//! Credentials and store selection from flags and the environment.

use clap::Args;

use rehost_cdn::{CLOUDINARY_API_URL, CloudinaryCredentials};
use rehost_store::DEFAULT_DATABASE;

/// Prefix the storefront uses for the same Cloudinary variables.
const STOREFRONT_PREFIX: &str = "NEXT_PUBLIC_";

/// Image host settings.
#[derive(Debug, Clone, Args)]
pub struct CloudinaryArgs {
    /// Cloudinary cloud name
    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    pub cloud_name: Option<String>,

    /// Cloudinary API key
    #[arg(long, env = "CLOUDINARY_API_KEY")]
    pub api_key: Option<String>,

    /// Cloudinary API secret
    #[arg(long, env = "CLOUDINARY_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Cloudinary API root
    #[arg(long, env = "CLOUDINARY_API_URL", default_value = CLOUDINARY_API_URL)]
    pub cloudinary_url: String,
}

impl CloudinaryArgs {
    /// Resolve credentials, falling back to the `NEXT_PUBLIC_` variables.
    ///
    /// On failure returns the names of every missing variable.
    pub fn credentials(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<CloudinaryCredentials, Vec<&'static str>> {
        let resolve = |value: &Option<String>, var: &'static str| {
            non_empty(value.clone())
                .or_else(|| non_empty(lookup(&format!("{}{}", STOREFRONT_PREFIX, var))))
        };

        let cloud_name = resolve(&self.cloud_name, "CLOUDINARY_CLOUD_NAME");
        let api_key = resolve(&self.api_key, "CLOUDINARY_API_KEY");
        let api_secret = resolve(&self.api_secret, "CLOUDINARY_API_SECRET");

        match (cloud_name, api_key, api_secret) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Ok(CloudinaryCredentials {
                cloud_name,
                api_key,
                api_secret,
            }),
            (cloud_name, api_key, api_secret) => Err([
                (cloud_name.is_none(), "CLOUDINARY_CLOUD_NAME"),
                (api_key.is_none(), "CLOUDINARY_API_KEY"),
                (api_secret.is_none(), "CLOUDINARY_API_SECRET"),
            ]
            .into_iter()
            .filter_map(|(missing, var)| missing.then_some(var))
            .collect()),
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Args)]
pub struct FirestoreArgs {
    /// Firestore project ID
    #[arg(long, env = "FIRESTORE_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Firestore database ID
    #[arg(long, env = "FIRESTORE_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// OAuth access token for the Firestore REST API
    #[arg(long, env = "FIRESTORE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Firestore emulator host:port (no authentication)
    #[arg(long, env = "FIRESTORE_EMULATOR_HOST")]
    pub emulator_host: Option<String>,
}

/// Where documents are read from and written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Emulator {
        host: String,
        project_id: String,
        database: String,
    },
    Firestore {
        project_id: String,
        database: String,
        access_token: String,
    },
}

impl FirestoreArgs {
    pub fn target(&self) -> Result<StoreTarget, String> {
        let project_id = non_empty(self.project_id.clone())
            .ok_or_else(|| "FIRESTORE_PROJECT_ID is required".to_string())?;

        if let Some(host) = non_empty(self.emulator_host.clone()) {
            return Ok(StoreTarget::Emulator {
                host,
                project_id,
                database: self.database.clone(),
            });
        }

        let access_token = non_empty(self.access_token.clone()).ok_or_else(|| {
            "FIRESTORE_ACCESS_TOKEN is required unless FIRESTORE_EMULATOR_HOST is set".to_string()
        })?;

        Ok(StoreTarget::Firestore {
            project_id,
            database: self.database.clone(),
            access_token,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
