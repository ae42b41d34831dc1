use arbor_core::{Component, CoreResult, RenderCtx, Scope};
use serde_json::json;
use std::fmt::Write as _;

/// A yes/no question. Call it; it answers `true` or `false`.
pub struct Confirm {
    question: String,
}

impl Confirm {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

impl Component for Confirm {
    fn render(&self, ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
        let yes = ctx.action(|_me: &mut Confirm, scope: &mut Scope<'_>| {
            Ok(scope.answer(vec![json!(true)]))
        });
        let no = ctx.action(|_me: &mut Confirm, scope: &mut Scope<'_>| {
            Ok(scope.answer(vec![json!(false)]))
        });
        write!(
            ctx,
            "<div class=\"confirm\"><p>{}</p>\
             <a href=\"?{yes}\">yes</a> <a href=\"?{no}\">no</a></div>",
            self.question
        )?;
        Ok(())
    }
}
