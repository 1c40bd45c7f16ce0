use crate::api::UserInfo;
use crate::navigation::login_path;
use crate::store::Store;
use crate::ClientContext;

/// Profile of the signed-in user.
///
/// A token that no longer resolves to a profile is evicted from storage and
/// the navigator is sent back to login.
pub struct UserInfos;

impl UserInfos {
    pub fn attach(ctx: &ClientContext) -> Store<Option<UserInfo>> {
        let user_infos = Store::new(None);
        let publish = user_infos.clone();
        let api = ctx.api().clone();
        let tokens = ctx.tokens();
        let navigator = ctx.navigator();
        let return_url = ctx.return_url().map(str::to_string);

        ctx.access_token().subscribe(move |value| {
            let Some(token) = value.clone() else {
                return;
            };

            let api = api.clone();
            let tokens = tokens.clone();
            let navigator = navigator.clone();
            let return_url = return_url.clone();
            let publish = publish.clone();

            crate::spawn_detached(async move {
                match api.get_user_infos(&token).await {
                    Some(infos) => publish.set(Some(infos)),
                    None => {
                        if let Err(e) = tokens.remove() {
                            log::warn!("Failed to remove access token: {}", e);
                        }
                        log::info!("No user infos, redirecting to login");
                        navigator.goto(&login_path(return_url.as_deref()));
                    }
                }
            });
        });

        user_infos
    }
}
