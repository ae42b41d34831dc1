//! Drives a one-component session the way a browser would: render, click a
//! labeled link, go back.
//!
//! Run with `RUST_LOG=debug` to watch the walks.

use anyhow::Context;
use arbor::prelude::*;
use std::fmt::Write as _;

struct Counter {
    count: i64,
}

impl Component for Counter {
    fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
        let up = ctx.action(|me: &mut Counter, _scope: &mut Scope<'_>| {
            me.count += 1;
            Ok(Flow::Continue)
        });
        let down = ctx.action(|me: &mut Counter, _scope: &mut Scope<'_>| {
            me.count -= 1;
            Ok(Flow::Continue)
        });
        write!(
            ctx,
            "<p>count = {}</p><a href=\"?{up}\">++</a> <a href=\"?{down}\">--</a>",
            self.count
        )?;
        Ok(())
    }

    fn backtrack_state(&self, scope: &mut BacktrackScope<'_>) {
        scope.save("count", self.count);
    }

    fn restore_state(&mut self, field: &str, value: &dyn Saved) -> CoreResult<()> {
        self.count = restore_as(field, value)?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    arbor::telemetry::init();

    let mut session = Session::new(&SessionConfig::default(), Counter { count: 0 });
    let start = session.handle(SessionRequest::new())?;
    println!("GET   -> {}", start.body);

    let page = click(&mut session, &start, "++", None)?;
    let page = click(&mut session, &page, "++", None)?;
    let page = click(&mut session, &page, "--", None)?;
    println!("3 clicks -> {}", page.body);

    // Browser back to the very first page, then click ++ there.
    let replayed = click(&mut session, &start, "++", Some(start.generation))?;
    println!("back+click -> {}", replayed.body);

    Ok(())
}

/// Follow the link labeled `label` on `page`, optionally going back first.
fn click(
    session: &mut Session,
    page: &Response,
    label: &str,
    back_to: Option<u64>,
) -> anyhow::Result<Response> {
    let form = Request::new().with_trigger(token_for(&page.body, label)?);
    let mut request = SessionRequest::from(form);
    if let Some(generation) = back_to {
        request = request.with_rewind(generation);
    }
    Ok(session.handle(request)?)
}

/// The token inside `<a href="?TOKEN">label</a>`.
fn token_for(body: &str, label: &str) -> anyhow::Result<Token> {
    let needle = format!("\">{label}</a>");
    let end = body
        .find(&needle)
        .with_context(|| format!("no link labeled {label}"))?;
    let head = &body[..end];
    let start = head.rfind('?').context("link carries no token")?;
    Ok(head[start + 1..].parse()?)
}
