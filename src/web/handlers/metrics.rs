use salvo::prelude::*;

use crate::web::metrics::format_prometheus;
use crate::web::web_state;

#[handler]
pub async fn metrics(res: &mut Response) {
    let state = web_state();
    res.render(Text::Plain(format_prometheus(
        &state.metrics,
        state.started_at.elapsed(),
    )));
}
