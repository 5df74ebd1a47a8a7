//! Operations callable on a terminal and on its widgets

use st_protocol::{RemoteError, Value, WidgetId};

use crate::registry::{Args, Registry};
use crate::terminal::{no_such_widget, Terminal};
use crate::widget::Widget;

/// Handler of a terminal-level operation
pub type TerminalHandler = fn(&mut Terminal, Args<'_>) -> Result<Value, RemoteError>;

/// Handler of a widget-level operation; the widget is known to exist
pub type WidgetHandler = fn(&mut Terminal, WidgetId, Args<'_>) -> Result<Value, RemoteError>;

/// Every operation a controller may call on the terminal
pub fn terminal_registry() -> Registry<TerminalHandler> {
    Registry::<TerminalHandler>::new("terminal")
        .read("width", |t, _| Ok(t.width().into()))
        .read("height", |t, _| Ok(t.height().into()))
        .read("size", |t, _| {
            let (w, h) = t.size();
            Ok(vec![w, h].into())
        })
        .read("cursor", |t, _| {
            let (x, y) = t.cursor();
            Ok(vec![x, y].into())
        })
        .read("current_tick", |t, _| Ok(Value::Int(t.current_tick() as i64)))
        .read("exit_code", |t, _| Ok(t.exit_code().into()))
        .read("tps", |t, _| Ok(Value::Int(i64::from(t.tps()))))
        .read("mouse", |t, _| Ok(t.mouse_value()))
        .invoke("getch", |t, _| Ok(t.getch().into()))
        .invoke("peekch", |t, _| Ok(t.peekch().into()))
        .invoke("ungetch", |t, args| {
            t.ungetch(args.i64(0, "key")?);
            Ok(Value::Unit)
        })
        .invoke("getgch", |t, _| Ok(t.getgch().into()))
        .invoke("peekgch", |t, _| Ok(t.peekgch().into()))
        .invoke("ungetgch", |t, args| {
            t.ungetgch(args.i64(0, "key")?);
            Ok(Value::Unit)
        })
        .invoke("putstr", putstr)
        .invoke("clear", |t, _| {
            t.clear();
            Ok(Value::Unit)
        })
        .invoke("set_cursor", |t, args| {
            t.set_cursor(args.u16(0, "x")?, args.u16(1, "y")?)?;
            Ok(Value::Unit)
        })
        .invoke("resize", |t, args| {
            t.resize(args.u16(0, "width")?, args.u16(1, "height")?)?;
            Ok(Value::Unit)
        })
        .invoke("end", |t, args| {
            t.end(args.opt_i64(0, "code")?);
            Ok(Value::Unit)
        })
        .invoke("exit", exit)
        .invoke("add_button", add_button)
        .invoke("add_label", |t, args| {
            let position = (args.u16(0, "x")?, args.u16(1, "y")?);
            let text = args.str(2, "text")?;
            Ok(t.add_widget(|id| Widget::label(id, position, text)).into())
        })
        .invoke("get_widget", |t, args| {
            let id = args.widget(0, "id")?;
            match t.widget(id) {
                Some(w) if !w.closed => Ok(Value::Widget(id)),
                _ => Err(no_such_widget(id)),
            }
        })
        .invoke("del_widget", |t, args| {
            t.del_widget(args.widget(0, "id")?)?;
            Ok(Value::Unit)
        })
        .invoke("widgets", |t, _| Ok(t.widget_ids().into()))
        .invoke("after", |t, args| {
            let timer = t.after(args.u64(0, "ticks")?, args.callback(1, "callback")?);
            Ok(Value::Int(timer as i64))
        })
        .invoke("cancel", |t, args| Ok(t.cancel(args.u64(0, "id")?).into()))
        .invoke("release_callback", |t, args| {
            let released = t.release_callback(args.callback(0, "callback")?);
            Ok(Value::Int(released as i64))
        })
        .invoke("destroy", |t, _| {
            t.request_exit(None);
            Ok(Value::Unit)
        })
}

fn putstr(t: &mut Terminal, args: Args<'_>) -> Result<Value, RemoteError> {
    let text = args.str(0, "msg")?;
    t.putstr(text, args.opt_u16(1, "x")?, args.opt_u16(2, "y")?);
    Ok(Value::Unit)
}

/// Cooperative cancellation: the dispatcher stops the loop on this error
fn exit(t: &mut Terminal, args: Args<'_>) -> Result<Value, RemoteError> {
    let code = args.opt_i64(0, "code")?.unwrap_or(0);
    t.set_exit_code(code);
    Err(RemoteError::cancelled(format!("exit({}) requested", code)))
}

fn add_button(t: &mut Terminal, args: Args<'_>) -> Result<Value, RemoteError> {
    let position = (args.u16(0, "x")?, args.u16(1, "y")?);
    let size = (args.u16(2, "width")?, args.u16(3, "height")?);
    let text = args.str(4, "text")?;
    let callback = args.opt_callback(5, "callback")?;
    Ok(t
        .add_widget(|id| Widget::button(id, position, size, text, callback))
        .into())
}

/// Every operation a controller may call on a widget
pub fn widget_registry() -> Registry<WidgetHandler> {
    Registry::<WidgetHandler>::new("widget")
        .read("id", |_, id, _| Ok(Value::Widget(id)))
        .read("kind", |t, id, _| Ok(widget(t, id)?.kind.to_string().into()))
        .read("x", |t, id, _| Ok(widget(t, id)?.x.into()))
        .read("y", |t, id, _| Ok(widget(t, id)?.y.into()))
        .read("width", |t, id, _| Ok(widget(t, id)?.width.into()))
        .read("height", |t, id, _| Ok(widget(t, id)?.height.into()))
        .read("text", |t, id, _| Ok(widget(t, id)?.text.clone().into()))
        .read("hidden", |t, id, _| Ok(widget(t, id)?.hidden.into()))
        .read("closed", |t, id, _| Ok(widget(t, id)?.closed.into()))
        .read("z_index", |t, id, _| Ok(widget(t, id)?.z_index.into()))
        .invoke("set_position", |t, id, args| {
            let (x, y) = (args.u16(0, "x")?, args.u16(1, "y")?);
            widget_mut(t, id)?.set_position(x, y);
            Ok(Value::Unit)
        })
        .invoke("move", |t, id, args| {
            let (dx, dy) = (args.i64(0, "dx")?, args.i64(1, "dy")?);
            widget_mut(t, id)?.move_by(dx, dy);
            Ok(Value::Unit)
        })
        .invoke("resize", |t, id, args| {
            let (w, h) = (args.u16(0, "width")?, args.u16(1, "height")?);
            widget_mut(t, id)?.resize(w, h);
            Ok(Value::Unit)
        })
        .invoke("set_text", |t, id, args| {
            let text = args.str(0, "text")?;
            widget_mut(t, id)?.set_text(text);
            Ok(Value::Unit)
        })
        .invoke("show", |t, id, _| {
            widget_mut(t, id)?.show();
            Ok(Value::Unit)
        })
        .invoke("hide", |t, id, _| {
            widget_mut(t, id)?.hide();
            Ok(Value::Unit)
        })
        .invoke("has_coord", |t, id, args| {
            let (x, y) = (args.u16(0, "x")?, args.u16(1, "y")?);
            Ok(widget(t, id)?.has_coord(x, y).into())
        })
        .invoke("set_callback", |t, id, args| {
            let callback = args.opt_callback(0, "callback")?;
            widget_mut(t, id)?.callback = callback;
            Ok(Value::Unit)
        })
        .invoke("activate", |t, id, _| Ok(t.activate(id)?.into()))
        .invoke("close", |t, id, _| {
            widget_mut(t, id)?.close();
            Ok(Value::Unit)
        })
}

fn widget(t: &Terminal, id: WidgetId) -> Result<&Widget, RemoteError> {
    t.widget(id).ok_or_else(|| no_such_widget(id))
}

fn widget_mut(t: &mut Terminal, id: WidgetId) -> Result<&mut Widget, RemoteError> {
    t.widget_mut(id).ok_or_else(|| no_such_widget(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_protocol::{CallbackId, Kwargs, Operation, RemoteErrorKind};

    fn call(t: &mut Terminal, op: Operation, args: &[Value]) -> Result<Value, RemoteError> {
        let handler = terminal_registry().lookup(&op)?;
        handler(t, Args::new(args, &Kwargs::new()))
    }

    fn call_widget(
        t: &mut Terminal,
        id: WidgetId,
        op: Operation,
        args: &[Value],
    ) -> Result<Value, RemoteError> {
        let handler = widget_registry().lookup(&op)?;
        handler(t, id, Args::new(args, &Kwargs::new()))
    }

    #[test]
    fn test_read_width() {
        let mut t = Terminal::new(80, 24, 30);
        assert_eq!(call(&mut t, Operation::read("width").unwrap(), &[]), Ok(Value::Int(80)));
        assert_eq!(
            call(&mut t, Operation::read("size").unwrap(), &[]),
            Ok(Value::from(vec![80i64, 24]))
        );
    }

    #[test]
    fn test_exit_is_cancellation() {
        let mut t = Terminal::new(80, 24, 30);
        let err = call(&mut t, Operation::invoke("exit").unwrap(), &[Value::Int(3)]).unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(t.exit_code(), Some(3));
    }

    #[test]
    fn test_button_lifecycle() {
        let mut t = Terminal::new(80, 24, 30);
        let args = [
            Value::Int(1),
            Value::Int(2),
            Value::Int(6),
            Value::Int(1),
            Value::from("OK"),
            Value::Callback(CallbackId(7)),
        ];
        let id = call(&mut t, Operation::invoke("add_button").unwrap(), &args)
            .unwrap()
            .as_widget()
            .unwrap();

        assert_eq!(
            call_widget(&mut t, id, Operation::read("text").unwrap(), &[]),
            Ok(Value::from("OK"))
        );
        assert_eq!(
            call_widget(&mut t, id, Operation::invoke("activate").unwrap(), &[]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            t.drain_notifications(),
            vec![(CallbackId(7), Value::Widget(id))]
        );

        call_widget(&mut t, id, Operation::invoke("close").unwrap(), &[]).unwrap();
        assert_eq!(
            call(&mut t, Operation::invoke("get_widget").unwrap(), &[Value::Widget(id)])
                .unwrap_err()
                .kind,
            RemoteErrorKind::Index
        );
    }

    #[test]
    fn test_key_operations() {
        let mut t = Terminal::new(80, 24, 30);
        assert_eq!(call(&mut t, Operation::invoke("getch").unwrap(), &[]), Ok(Value::Unit));

        t.feed(crate::input::InputEvent::Key(65));
        call(&mut t, Operation::invoke("ungetch").unwrap(), &[Value::Int(66)]).unwrap();
        assert_eq!(call(&mut t, Operation::invoke("peekch").unwrap(), &[]), Ok(Value::Int(66)));
        assert_eq!(call(&mut t, Operation::invoke("getch").unwrap(), &[]), Ok(Value::Int(65)));
        assert_eq!(call(&mut t, Operation::invoke("getgch").unwrap(), &[]), Ok(Value::Int(65)));
        assert_eq!(call(&mut t, Operation::invoke("getgch").unwrap(), &[]), Ok(Value::Unit));

        let mouse = call(&mut t, Operation::read("mouse").unwrap(), &[]).unwrap();
        assert_eq!(mouse.as_map().unwrap()["left"], Value::Bool(false));
    }

    #[test]
    fn test_registries_cover_operation_set() {
        assert_eq!(terminal_registry().len(), 29);
        assert_eq!(widget_registry().len(), 20);
    }
}
