use std::{
    env::{self, VarError},
    ffi::OsStr,
    sync::Arc,
};

use humantime::parse_duration;
use log::warn;

use crate::{
    error::{Error, Result},
    store::{BoxedStore, GithubStore, LocalStore, StoreUrl},
};

use super::args::GlobalArgs;

const ENV_VAR_STORE: &str = "GITDROP_STORE";
const ENV_VAR_TOKEN: &str = "GITDROP_TOKEN";
const ENV_VAR_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
const ENV_VAR_LATENCY: &str = "GITDROP_LATENCY";

pub fn create_store(args: &GlobalArgs) -> Result<BoxedStore> {
    match store_url(args)? {
        StoreUrl::Github(api_url) => {
            let token = match &args.token {
                Some(token) => Some(token.clone()),
                None => get_env_var(ENV_VAR_TOKEN)?.or(get_env_var(ENV_VAR_GITHUB_TOKEN)?),
            };
            if token.is_none() {
                warn!("no token set, only public repositories can be read");
            }

            let github_store = GithubStore::new(api_url, token)?;
            Ok(Arc::new(github_store))
        }
        StoreUrl::Local(_) => {
            let local_store = create_local_store(args)?;
            Ok(Arc::new(local_store))
        }
    }
}

pub fn create_local_store(args: &GlobalArgs) -> Result<LocalStore> {
    let StoreUrl::Local(path) = store_url(args)? else {
        return Err(Error::Cli(
            "repositories can only be created in a local store".to_owned(),
        ));
    };

    let latency = match args.latency {
        Some(latency) => Some(latency),
        None => get_env_var(ENV_VAR_LATENCY)?
            .as_deref()
            .map(parse_duration)
            .transpose()?,
    };

    Ok(LocalStore::new(path, latency))
}

fn store_url(args: &GlobalArgs) -> Result<StoreUrl> {
    if let Some(url) = &args.store {
        return Ok(url.clone());
    }

    match get_env_var(ENV_VAR_STORE)? {
        Some(url) => url.parse(),
        None => Ok(StoreUrl::default()),
    }
}

fn get_env_var<T: AsRef<OsStr>>(name: T) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
