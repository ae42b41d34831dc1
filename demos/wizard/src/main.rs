//! A two-dialog flow on top of call/answer: a profile page that delegates to
//! the prebuilt `Prompt` and `Confirm` components and is resumed with their
//! answers, plus a browser-back jump that undoes the lot.

use anyhow::Context;
use arbor::prelude::*;
use std::fmt::Write as _;

struct Profile {
    name: String,
}

impl Component for Profile {
    fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
        let rename = ctx.action(|_me: &mut Profile, scope: &mut Scope<'_>| {
            Ok(scope.call(Prompt::new("Your name"), ResumeTarget::method("rename"), vec![]))
        });
        let reset = ctx.action(|_me: &mut Profile, scope: &mut Scope<'_>| {
            Ok(scope.call(
                Confirm::new("Really forget the name?"),
                ResumeTarget::method("reset"),
                vec![],
            ))
        });
        write!(
            ctx,
            "<h1>profile: {}</h1><a href=\"?{rename}\">rename</a> <a href=\"?{reset}\">reset</a>",
            if self.name.is_empty() { "(unnamed)" } else { &self.name }
        )?;
        Ok(())
    }

    fn resume(
        &mut self,
        method: &str,
        _scope: &mut Scope<'_>,
        args: Vec<Value>,
    ) -> CoreResult<Flow> {
        match method {
            "rename" => {
                self.name = args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Flow::Continue)
            }
            "reset" => {
                if args.first().and_then(Value::as_bool).unwrap_or(false) {
                    self.name.clear();
                }
                Ok(Flow::Continue)
            }
            other => Err(CoreError::ResumeTarget {
                target: other.to_string(),
                reason: "unknown resume method".to_string(),
            }),
        }
    }

    fn backtrack_state(&self, scope: &mut BacktrackScope<'_>) {
        scope.save("name", self.name.clone());
    }

    fn restore_state(&mut self, field: &str, value: &dyn Saved) -> CoreResult<()> {
        self.name = restore_as(field, value)?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    arbor::telemetry::init();

    let mut session = Session::new(
        &SessionConfig::default(),
        Profile {
            name: String::new(),
        },
    );
    let start = session.handle(SessionRequest::new())?;
    println!("GET      -> {}", start.body);

    // rename: the call finalizes the request and the prompt takes over.
    let prompt = click(&mut session, &start, "rename")?;
    println!("rename   -> {}", prompt.body);

    // Fill the field and submit; the profile is resumed with the answer.
    let field = token_in(&prompt.body, "name=\"")?;
    let ok = token_in(&prompt.body, "href=\"?")?;
    let named = session.handle(
        Request::new()
            .with_submit(field, json!("Ada"))
            .with_trigger(ok)
            .into(),
    )?;
    println!("answer   -> {}", named.body);

    // reset via the confirm dialog, answering yes.
    let confirm = click(&mut session, &named, "reset")?;
    let cleared = click(&mut session, &confirm, "yes")?;
    println!("confirm  -> {}", cleared.body);

    // Browser back to the named page: the snapshot log restores the name.
    let form = Request::new();
    let back = session.handle(SessionRequest::from(form).with_rewind(named.generation))?;
    println!("back     -> {}", back.body);

    Ok(())
}

fn click(session: &mut Session, page: &Response, label: &str) -> anyhow::Result<Response> {
    let needle = format!("\">{label}</a>");
    let end = page
        .body
        .find(&needle)
        .with_context(|| format!("no link labeled {label}"))?;
    let head = &page.body[..end];
    let start = head.rfind('?').context("link carries no token")?;
    let token: Token = head[start + 1..].parse()?;
    Ok(session.handle(Request::new().with_trigger(token).into())?)
}

/// First token after `marker`.
fn token_in(body: &str, marker: &str) -> anyhow::Result<Token> {
    let at = body
        .find(marker)
        .with_context(|| format!("no {marker} in body"))?;
    let rest = &body[at + marker.len()..];
    let rest = &rest[rest.find("cb").context("no token after marker")?..];
    let end = rest[2..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| i + 2)
        .unwrap_or(rest.len());
    Ok(rest[..end].parse()?)
}
