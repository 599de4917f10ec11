//! TUI rendering functions

use super::app::{InspectorApp, NoticeLevel};
use crate::channel::{ConnectionState, LiveChannel};
use hookscope_common::{
    can_render_as_code, parse_url_form, BodyKind, FormattedBody, Method, RequestEvent,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

/// Draw the inspection view
pub fn draw(frame: &mut Frame, app: &InspectorApp, channel: &LiveChannel) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Session info
            Constraint::Min(5),    // Requests + detail
            Constraint::Length(3), // Notices
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    draw_header(frame, app, channel, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);

    draw_request_list(frame, channel, body[0]);
    draw_detail(frame, app, channel, body[1]);
    draw_notices(frame, app, chunks[2]);
    draw_footer(frame, chunks[3]);
}

fn draw_header(frame: &mut Frame, app: &InspectorApp, channel: &LiveChannel, area: Rect) {
    let state = channel.state();
    let status_color = match state {
        ConnectionState::Open => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Unopened => Color::DarkGray,
        ConnectionState::Closed(reason) if reason.invalidates_session() => Color::Red,
        ConnectionState::Closed(_) => Color::Yellow,
    };

    let status = match state {
        ConnectionState::Closed(reason) => format!("{} ({})", state.label(), reason),
        _ => state.label().to_string(),
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("Session   ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                app.info.identifier.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("   hookscope v{}", app.info.version),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(vec![
            Span::styled("Status    ", Style::default().fg(Color::DarkGray)),
            Span::styled(status, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(vec![
            Span::styled("Send to   ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.info.send_url.clone(), Style::default().fg(Color::Green)),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_request_list(frame: &mut Frame, channel: &LiveChannel, area: Rect) {
    let log = channel.log();

    let header = Row::new(vec!["Time", "Method", "Path"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = log
        .iter()
        .map(|entry| {
            let event = &entry.event;
            Row::new(vec![
                Cell::from(event.time.format("%H:%M:%S").to_string()),
                Cell::from(format!("{:>7}", event.method.as_str())).style(method_style(&event.method)),
                Cell::from(event.uri.clone()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(format!(" Requests ({}) ", log.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
    .row_highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let mut state = TableState::default();
    state.select(log.selected_index());

    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_detail(frame: &mut Frame, app: &InspectorApp, channel: &LiveChannel, area: Rect) {
    let block = Block::default()
        .title(" Detail ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let log = channel.log();
    let lines = match log.selected() {
        Some(entry) => detail_lines(&entry.event, app.show_raw),
        None if log.is_empty() => vec![Line::from(Span::styled(
            "Waiting for requests...",
            Style::default().fg(Color::DarkGray),
        ))],
        None => vec![Line::from(Span::styled(
            "Select a request",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));

    frame.render_widget(paragraph, area);
}

fn draw_notices(frame: &mut Frame, app: &InspectorApp, area: Rect) {
    let lines: Vec<Line> = app
        .notices
        .iter()
        .map(|notice| {
            let color = match notice.level {
                NoticeLevel::Info => Color::DarkGray,
                NoticeLevel::Warning => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(notice.text.clone(), Style::default().fg(color)))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_footer(frame: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Cyan);
    let hint = Style::default().fg(Color::DarkGray);

    let text = Line::from(vec![
        Span::styled("↑/↓", key),
        Span::styled(" Select  ", hint),
        Span::styled("PgUp/PgDn", key),
        Span::styled(" Scroll  ", hint),
        Span::styled("t", key),
        Span::styled(" Raw body  ", hint),
        Span::styled("c", key),
        Span::styled(" Close  ", hint),
        Span::styled("r", key),
        Span::styled(" Reopen  ", hint),
        Span::styled("q", key),
        Span::styled(" Quit", hint),
    ]);

    frame.render_widget(Paragraph::new(text), area);
}

/// Lines describing one request
pub(crate) fn detail_lines(event: &RequestEvent, show_raw: bool) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::DarkGray);
    let section = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(event.method.to_string(), method_style(&event.method)),
            Span::raw(" "),
            Span::styled(event.uri.clone(), Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::from(vec![
            Span::styled("Time  ", label),
            Span::raw(event.time.to_rfc3339()),
        ]),
    ];

    let from = event
        .remote
        .client_ip
        .map(|ip| ip.to_string())
        .or_else(|| event.remote.remote_ip.map(|addr| addr.ip().to_string()));
    if let Some(from) = from {
        lines.push(Line::from(vec![Span::styled("From  ", label), Span::raw(from)]));
    }
    if let Some(host) = &event.remote.host {
        lines.push(Line::from(vec![Span::styled("Host  ", label), Span::raw(host.clone())]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Headers", section)));
    for (name, values) in &event.headers {
        for value in values {
            lines.push(Line::from(vec![
                Span::styled(format!("{}: ", name), Style::default().fg(Color::Cyan)),
                Span::raw(value.clone()),
            ]));
        }
    }

    if !event.cookies.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Cookies", section)));
        for (name, values) in &event.cookies {
            lines.push(Line::from(vec![
                Span::styled(format!("{} = ", name), Style::default().fg(Color::Cyan)),
                Span::raw(values.join(", ")),
            ]));
        }
    }

    let kind = event.body_kind();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(format!("Body ({})", kind.as_str()), section)));

    if event.is_truncated() {
        lines.push(Line::from(Span::styled(
            "Body was truncated by the server",
            Style::default().fg(Color::Yellow),
        )));
    }

    lines.extend(body_lines(event, show_raw));
    lines
}

fn body_lines(event: &RequestEvent, show_raw: bool) -> Vec<Line<'static>> {
    let muted = Style::default().fg(Color::DarkGray);
    let code = Style::default().fg(Color::Cyan);

    if show_raw {
        return match event.body.as_deref() {
            Some(raw) if !raw.is_empty() => text_lines(raw, Style::default()),
            _ => vec![Line::from(Span::styled("(no body)", muted))],
        };
    }

    match event.formatted_body() {
        FormattedBody::NoBody => vec![Line::from(Span::styled("(no body)", muted))],
        FormattedBody::Tree { value, .. } => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => text_lines(&pretty, code),
            Err(_) => text_lines(&value.to_string(), code),
        },
        FormattedBody::Malformed { kind, error, raw } => {
            let mut lines = vec![Line::from(Span::styled(
                format!("Could not parse {}: {}", kind.as_str(), error),
                Style::default().fg(Color::Red),
            ))];
            lines.extend(text_lines(&raw, Style::default()));
            lines
        }
        FormattedBody::PlainText {
            kind: BodyKind::UrlForm,
            text,
        } => parse_url_form(&text)
            .into_iter()
            .map(|(key, value)| {
                Line::from(vec![
                    Span::styled(format!("{} = ", key), Style::default().fg(Color::Cyan)),
                    Span::raw(value),
                ])
            })
            .collect(),
        FormattedBody::PlainText { text, .. } => {
            let renders_as_code = event
                .content_type
                .as_deref()
                .map(can_render_as_code)
                .unwrap_or(false);
            text_lines(&text, if renders_as_code { code } else { Style::default() })
        }
    }
}

fn text_lines(text: &str, style: Style) -> Vec<Line<'static>> {
    text.lines()
        .map(|line| Line::from(Span::styled(line.to_string(), style)))
        .collect()
}

/// Get style for HTTP method
fn method_style(method: &Method) -> Style {
    match method {
        Method::Get => Style::default().fg(Color::Green),
        Method::Post => Style::default().fg(Color::Yellow),
        Method::Put => Style::default().fg(Color::Blue),
        Method::Patch => Style::default().fg(Color::Magenta),
        Method::Delete => Style::default().fg(Color::Red),
        Method::Head => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::White),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::app::SessionInfo;
    use hookscope_common::decode_frame;
    use ratatui::{backend::TestBackend, Terminal};

    fn event(content_type: &str, body: &str) -> RequestEvent {
        let mut event = decode_frame(&crate::testing::frame("POST", "/hook")).unwrap();
        event.content_type = Some(content_type.to_string());
        event.body = Some(body.to_string());
        event
    }

    fn text(lines: &[Line]) -> String {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_json_body_is_pretty_printed() {
        let rendered = text(&detail_lines(&event("application/json", r#"{"a":1}"#), false));
        assert!(rendered.contains("Body (json)"));
        assert!(rendered.contains("\"a\": 1"));
    }

    #[test]
    fn test_malformed_body_shows_raw_text() {
        let rendered = text(&detail_lines(&event("application/json", "{oops"), false));
        assert!(rendered.contains("Could not parse json"));
        assert!(rendered.contains("{oops"));
    }

    #[test]
    fn test_url_form_as_pairs() {
        let rendered = text(&detail_lines(
            &event("application/x-www-form-urlencoded", "name=a+b&x=%26"),
            false,
        ));
        assert!(rendered.contains("name = a b"));
        assert!(rendered.contains("x = &"));
    }

    #[test]
    fn test_raw_toggle_and_empty_body() {
        let rendered = text(&detail_lines(&event("application/json", r#"{"a":1}"#), true));
        assert!(rendered.contains(r#"{"a":1}"#));

        let rendered = text(&detail_lines(&event("application/json", ""), false));
        assert!(rendered.contains("(no body)"));
    }

    #[tokio::test]
    async fn test_draw_empty_view() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::session::CredentialStore::open(dir.path().join("c.yml")).unwrap();
        let session = std::sync::Arc::new(
            crate::session::Session::new(crate::config::Config::default(), store).unwrap(),
        );
        let channel = LiveChannel::new(session);
        let app = InspectorApp::new(SessionInfo::new("abc", "http://localhost:18234/send/abc"));

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| draw(f, &app, &channel)).unwrap();

        let screen: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("abc"));
        assert!(screen.contains("Waiting for requests"));
        assert!(screen.contains("Requests (0)"));
    }
}
