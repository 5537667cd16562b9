use salvo::prelude::*;
use tracing::warn;

use crate::slack::SlashCommandForm;
use crate::web::web_state;

/// Slack posts every slash command here as a urlencoded form.
#[handler]
pub async fn slash_command(req: &mut Request, res: &mut Response) {
    let Some(state) = web_state() else {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
        res.render(Text::Plain("Bot is starting"));
        return;
    };

    let form = match req.parse_form::<SlashCommandForm>().await {
        Ok(form) => form,
        Err(err) => {
            warn!("malformed slash command form: {}", err);
            res.status_code(StatusCode::BAD_REQUEST);
            res.render(Text::Plain("Malformed command payload"));
            return;
        }
    };

    let reply = state.commands.handle(&form).await;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    res.status_code(status);
    res.render(Text::Plain(reply.body));
}
