//! single-page medical research assistant chat.
//!
//! - transcript rendered oldest-first, one labelled block per turn, long
//!   replies split into paragraphs at sentence boundaries.
//! - prompt line with enter-to-send; input is ignored while a reply is
//!   pending, and a busy line shows exactly for that interval.
//! - set MEDCHAT_QUERY (native) or open with `?messagefromquery=...` (wasm)
//!   to auto-submit a first message on load.
//!
//! env:
//!   GROQ_API_KEY     (key, read once by the gateway)
//!   MEDCHAT_QUERY    (optional initial message, may be percent-encoded)

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy_medchat::{
    submit_text, CompletionGateway, InitialQuery, MedChatPlugin, MedChatSet, Role, Session,
    split_paragraphs_default,
};

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct TranscriptText;
#[derive(Component)]
struct BusyText;
#[derive(Component)]
struct PromptText;

#[derive(Component, Copy, Clone)]
struct TargetSession(Entity);

// ---------------------- main ----------------------

fn main() {
    // the api key stays inside the gateway; nothing ui-side ever sees it
    let gateway = CompletionGateway::groq_from_env().expect("completion gateway");

    let mut app = App::new();
    app.insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(gateway)
        .add_plugins(DefaultPlugins)
        .add_plugins(MedChatPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, handle_text_input)
        // ui refresh runs after replies have been applied to the session
        .add_systems(
            Update,
            (refresh_transcript, refresh_busy, refresh_prompt).after(MedChatSet::Drain),
        );

    #[cfg(not(target_arch = "wasm32"))]
    if let Some(text) = bevy_medchat::query::initial_message_from_env() {
        info!(target: "chat", "initial query from env (len={})", text.len());
        app.insert_resource(InitialQuery(text));
    }
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
        if let Some(text) = bevy_medchat::query::initial_message_from_location() {
            info!(target: "chat", "initial query from location (len={})", text.len());
            app.insert_resource(InitialQuery(text));
        }
    }

    app.run();
}

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d::default());

    // the chat session entity
    let session = commands.spawn(Session::default()).id();

    let style_18 = TextFont {
        font_size: 18.0,
        ..default()
    };
    let style_14 = TextFont {
        font_size: 14.0,
        ..default()
    };

    // root: transcript on top, busy line, prompt line at the bottom
    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(8.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::NONE),
        ))
        .with_children(|p| {
            // scrollable transcript, oldest first
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Percent(100.0),
                    flex_direction: FlexDirection::Column,
                    overflow: Overflow::scroll_y(),
                    padding: UiRect::axes(Val::Px(8.0), Val::Px(12.0)),
                    ..default()
                },
                BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
                ScrollPosition::default(),
            ))
            .with_children(|c| {
                c.spawn((
                    Text::new(""),
                    style_18.clone(),
                    TextColor(Color::WHITE),
                    TranscriptText,
                    TargetSession(session),
                ));
            });

            p.spawn((
                Text::new(""),
                style_14.clone(),
                TextColor(Color::srgb_u8(50, 222, 159)),
                BusyText,
                TargetSession(session),
                Visibility::Hidden,
            ));

            p.spawn((
                Text::new("> "),
                style_14.clone(),
                TextColor(Color::WHITE),
                PromptText,
                TargetSession(session),
            ));
        });
}

// ---------------------- input ----------------------

fn handle_text_input(
    mut commands: Commands,
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    mut q: Query<(Entity, &mut Session)>,
) {
    let Ok((entity, mut session)) = q.single_mut() else {
        return;
    };

    // input is disabled while a reply is pending
    if session.is_awaiting_reply() {
        ev_kbd.clear();
        return;
    }

    for ev in ev_kbd.read() {
        if ev.state.is_pressed() {
            if let Some(txt) = &ev.text {
                let s = txt.replace('\r', "").replace('\n', "");
                session.push_draft(&s);
            }
        }
    }

    if keys.just_pressed(KeyCode::Backspace) {
        session.backspace_draft();
    }

    if keys.just_pressed(KeyCode::Enter) {
        let draft = session.draft_input().to_string();
        if !draft.trim().is_empty() {
            submit_text(&mut commands, entity, draft);
        }
    }
}

// ---------------------- text refresh ----------------------

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "User:",
        Role::Assistant => "Medical Research Assistant:",
        Role::System => "System:",
    }
}

fn refresh_transcript(
    sessions: Query<(Entity, &Session), Changed<Session>>,
    mut q_text: Query<(&TargetSession, &mut Text), With<TranscriptText>>,
    mut q_scroll: Query<&mut ScrollPosition>,
) {
    for (entity, session) in &sessions {
        let mut out = String::new();
        for turn in session.turns() {
            out.push_str(role_label(turn.role));
            out.push('\n');
            for para in split_paragraphs_default(&turn.content) {
                out.push_str(&para);
                out.push_str("\n\n");
            }
        }

        for (TargetSession(t), mut text) in q_text.iter_mut() {
            if *t == entity {
                text.0 = out.clone();
            }
        }
        // pin the view to the newest turn; bevy clamps the offset
        for mut scroll in q_scroll.iter_mut() {
            scroll.offset_y = f32::MAX;
        }
    }
}

fn refresh_busy(
    sessions: Query<(Entity, &Session), Changed<Session>>,
    mut q: Query<(&TargetSession, &mut Text, &mut Visibility), With<BusyText>>,
) {
    for (entity, session) in &sessions {
        for (TargetSession(t), mut text, mut vis) in q.iter_mut() {
            if *t != entity {
                continue;
            }
            if session.is_awaiting_reply() {
                text.0 = "Medical Research Assistant is thinking...".to_string();
                *vis = Visibility::Visible;
            } else {
                text.0.clear();
                *vis = Visibility::Hidden;
            }
        }
    }
}

fn refresh_prompt(
    sessions: Query<(Entity, &Session), Changed<Session>>,
    mut q: Query<(&TargetSession, &mut Text), With<PromptText>>,
) {
    for (entity, session) in &sessions {
        for (TargetSession(t), mut text) in q.iter_mut() {
            if *t != entity {
                continue;
            }
            text.0 = if session.is_awaiting_reply() {
                "> (waiting for reply)".to_string()
            } else {
                format!("> {}|", session.draft_input())
            };
        }
    }
}
