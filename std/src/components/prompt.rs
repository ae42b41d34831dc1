use arbor_core::{
    BacktrackScope, Component, CoreResult, Flow, RenderCtx, Saved, Scope, Value, restore_as,
};
use serde_json::json;
use std::fmt::Write as _;

/// A one-field form. Call it; it answers the submitted text.
pub struct Prompt {
    label: String,
    draft: String,
}

impl Prompt {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            draft: String::new(),
        }
    }
}

impl Component for Prompt {
    fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
        let field = ctx.value(|me: &mut Prompt, _scope: &mut Scope<'_>, value: &Value| {
            me.draft = value.as_str().unwrap_or_default().to_string();
            Ok(Flow::Continue)
        });
        let ok = ctx.action(|me: &mut Prompt, scope: &mut Scope<'_>| {
            Ok(scope.answer(vec![json!(me.draft.clone())]))
        });
        write!(
            ctx,
            "<div class=\"prompt\"><label>{}</label>\
             <input name=\"{field}\" value=\"{}\"/>\
             <a href=\"?{ok}\">ok</a></div>",
            self.label, self.draft
        )?;
        Ok(())
    }

    fn backtrack_state(&self, scope: &mut BacktrackScope<'_>) {
        scope.save("draft", self.draft.clone());
    }

    fn restore_state(&mut self, field: &str, value: &dyn Saved) -> CoreResult<()> {
        self.draft = restore_as(field, value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Confirm;
    use arbor_core::{CoreError, Request, ResumeTarget, Token};
    use arbor_session::{Session, SessionConfig, SessionRequest};
    use std::fmt::Write as _;

    /// A host that calls the prebuilt dialogs and shows what came back.
    struct Host {
        name: String,
        cleared: bool,
    }

    impl Component for Host {
        fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
            let rename = ctx.action(|_me: &mut Host, scope: &mut Scope<'_>| {
                Ok(scope.call(
                    Prompt::new("name"),
                    ResumeTarget::method("rename"),
                    vec![],
                ))
            });
            let clear = ctx.action(|_me: &mut Host, scope: &mut Scope<'_>| {
                Ok(scope.call(
                    Confirm::new("clear?"),
                    ResumeTarget::method("clear"),
                    vec![],
                ))
            });
            write!(
                ctx,
                "host name={} cleared={} rename=?{rename} clear=?{clear}",
                self.name, self.cleared
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
                "clear" => {
                    self.cleared = args.first().and_then(Value::as_bool).unwrap_or(false);
                    Ok(Flow::Continue)
                }
                other => Err(CoreError::ResumeTarget {
                    target: other.to_string(),
                    reason: "unknown resume method".to_string(),
                }),
            }
        }
    }

    // First token appearing after `marker` in the rendered body.
    fn token_after(body: &str, marker: &str) -> Token {
        let at = body.find(marker).unwrap_or_else(|| panic!("no {marker} in {body}"));
        let rest = &body[at + marker.len()..];
        let rest = &rest[rest.find("cb").unwrap()..];
        let end = rest[2..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|i| i + 2)
            .unwrap_or(rest.len());
        rest[..end].parse().unwrap()
    }

    #[test]
    fn test_prompt_answers_submitted_text() {
        let mut session = Session::new(
            &SessionConfig::default(),
            Host {
                name: String::new(),
                cleared: false,
            },
        );
        let page = session.handle(SessionRequest::new()).unwrap();

        let form = Request::new().with_trigger(token_after(&page.body, "rename="));
        let page = session.handle(form.into()).unwrap();
        assert!(page.body.contains("class=\"prompt\""));

        let field = token_after(&page.body, "name=\"");
        let ok = token_after(&page.body, "<a href=");
        let form = Request::new()
            .with_submit(field, json!("Ada"))
            .with_trigger(ok);
        let page = session.handle(form.into()).unwrap();

        assert!(page.body.contains("host name=Ada"));
    }

    #[test]
    fn test_confirm_answers_boolean() {
        let mut session = Session::new(
            &SessionConfig::default(),
            Host {
                name: String::new(),
                cleared: false,
            },
        );
        let page = session.handle(SessionRequest::new()).unwrap();

        let form = Request::new().with_trigger(token_after(&page.body, "clear="));
        let page = session.handle(form.into()).unwrap();
        assert!(page.body.contains("class=\"confirm\""));

        let yes = token_after(&page.body, "<a href=");
        let form = Request::new().with_trigger(yes);
        let page = session.handle(form.into()).unwrap();

        assert!(page.body.contains("cleared=true"));
    }
}
