use anyhow::{bail, Context, Result};

use dirk_core::UserAndService;
use dirk_reconcile::{fetch, MultiServicesUserReport};

use super::{print_json, Session};

pub async fn run(config_paths: &[String], service: &str, user_id: &str) -> Result<()> {
    let session = Session::load(config_paths)?;
    let properties = session.properties();
    let origin = session.service(service)?;

    let Some(user) = origin
        .existing_user_from_id_string(user_id, properties.as_ref())
        .await
        .with_context(|| format!("seed lookup failed in '{service}'"))?
    else {
        bail!("USER_NOT_FOUND '{user_id}' in service '{service}'");
    };
    let seed = UserAndService::new(user, origin.clone())?;

    let user = fetch(&seed, &session.services, properties.as_ref()).await?;
    print_json(&MultiServicesUserReport::from_user(&user))
}
