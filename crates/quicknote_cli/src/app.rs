//! Interactive shell state: renders core snapshots and forwards intents.

use crate::commands::{Command, NoteRef, HELP};
use log::info;
use quicknote_core::{
    CodeDelivery, DocumentStore, DraftPatch, IdentityProvider, Note, NoteId, NoteSynchronizer,
    RemoteResult, Session, SessionManager, SyncError,
};
use std::sync::Arc;

/// What the shell loop should do after a command.
pub enum Flow {
    Continue,
    /// Ask for confirmation, then call `App::delete_confirmed`.
    ConfirmDelete(Note),
    Quit,
}

/// Prints local-mode codes on stderr in place of an email.
pub struct TerminalDelivery;

impl CodeDelivery for TerminalDelivery {
    fn deliver(&self, email: &str, code: &str) -> RemoteResult<()> {
        eprintln!("[local] one-time code for {email}: {code}");
        Ok(())
    }
}

pub struct App {
    session: SessionManager,
    notes: NoteSynchronizer,
}

impl App {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        collection: &str,
    ) -> Self {
        let session = SessionManager::new(identity);
        let notes = NoteSynchronizer::new(store, session.subscribe(), collection);
        Self { session, notes }
    }

    /// Restores a persisted session and loads notes when it succeeds.
    pub async fn start(&self) {
        match self.session.restore().await {
            Ok(Some(user)) => {
                println!("signed in as {}", user.email);
                self.reload().await;
            }
            Ok(None) => println!("not signed in; use `login <email>`"),
            Err(err) => println!("could not restore session: {err}"),
        }
    }

    /// Prompt prefix reflecting session and draft state.
    pub fn prompt(&self) -> String {
        match self.session.session() {
            Session::Anonymous => "quicknote> ".to_string(),
            Session::OtpPending { email } => format!("code for {email}> "),
            Session::Authenticated { .. } => {
                if let Some(draft) = self.notes.edit_draft() {
                    format!("editing {}> ", draft.note_id)
                } else if self.notes.create_draft().is_some() {
                    "new note> ".to_string()
                } else {
                    "notes> ".to_string()
                }
            }
        }
    }

    pub async fn handle(&self, command: Command) -> Flow {
        match command {
            Command::Nothing => {}
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
            Command::Login(email) => match self.session.request_code(&email).await {
                Ok(()) => println!("code sent; use `verify <code>`"),
                Err(err) => println!("error: {err}"),
            },
            Command::Verify(code) => self.verify(&code).await,
            Command::Back => match self.session.cancel_pending().await {
                Ok(()) => println!("cancelled"),
                Err(err) => println!("error: {err}"),
            },
            Command::Logout => {
                let result = self.session.logout().await;
                self.notes.reset();
                match result {
                    Ok(()) => println!("signed out"),
                    Err(err) => println!("signed out, but clearing the saved session failed: {err}"),
                }
            }
            Command::WhoAmI => match self.session.session() {
                Session::Anonymous => println!("not signed in"),
                Session::OtpPending { email } => println!("waiting for the code sent to {email}"),
                Session::Authenticated { user } => println!("{} ({})", user.email, user.id),
            },
            Command::List => self.print_notes(),
            Command::Reload => self.reload().await,
            Command::New => {
                let draft = self.notes.begin_create();
                if draft.title.is_empty() && draft.content.is_empty() {
                    println!("new note; set `title` and `body`, then `save`");
                } else {
                    println!("resuming unsaved note \"{}\"", draft.title);
                }
            }
            Command::Title(title) => self.patch_draft(DraftPatch::title(title)),
            Command::Body(content) => self.patch_draft(DraftPatch::content(content)),
            Command::Save => self.save().await,
            Command::Cancel => {
                if self.notes.cancel_edit().is_some() {
                    println!("edit discarded");
                } else if self.notes.cancel_create().is_some() {
                    println!("new note discarded");
                } else {
                    println!("nothing to cancel");
                }
            }
            Command::Edit(target) => match self.resolve(&target) {
                Some(id) => match self.notes.begin_edit(&id) {
                    Ok(draft) => println!("editing \"{}\"", draft.title),
                    Err(err) => println!("error: {err}"),
                },
                None => println!("no such note"),
            },
            Command::Delete(target) => {
                match self.resolve(&target).and_then(|id| self.notes.note(&id)) {
                    Some(note) => return Flow::ConfirmDelete(note),
                    None => println!("no such note"),
                }
            }
        }
        Flow::Continue
    }

    pub async fn delete_confirmed(&self, id: &NoteId) {
        match self.notes.delete(id).await {
            Ok(_) => {
                println!("deleted");
                self.print_notes();
            }
            Err(err) => println!("error: {err}"),
        }
    }

    async fn verify(&self, code: &str) {
        let Some(email) = self.session.session().pending_email().map(str::to_string) else {
            println!("no code pending; use `login <email>` first");
            return;
        };
        match self.session.verify_code(&email, code).await {
            Ok(user) => {
                println!("signed in as {}", user.email);
                self.reload().await;
            }
            Err(err) => println!("error: {err}"),
        }
    }

    async fn reload(&self) {
        match self.notes.load().await {
            Ok(_) => self.print_notes(),
            Err(SyncError::Superseded) => {}
            Err(err) => println!("could not load notes: {err}"),
        }
    }

    async fn save(&self) {
        let result = if self.notes.edit_draft().is_some() {
            self.notes.commit_edit().await
        } else {
            self.notes.submit_create().await
        };
        match result {
            Ok(_) => {
                println!("saved");
                self.print_notes();
            }
            Err(err) => println!("error: {err}"),
        }
    }

    fn patch_draft(&self, patch: DraftPatch) {
        let result = if self.notes.edit_draft().is_some() {
            self.notes.update_edit_draft(&patch).map(|_| ())
        } else {
            self.notes.update_create_draft(&patch).map(|_| ())
        };
        if let Err(err) = result {
            println!("error: {err}; use `new` or `edit <n|id>` first");
        }
    }

    fn resolve(&self, target: &NoteRef) -> Option<NoteId> {
        match target {
            NoteRef::Position(position) => self
                .notes
                .notes()
                .get(position - 1)
                .map(|note| note.id.clone()),
            NoteRef::Id(id) => Some(NoteId::from(id.as_str())),
        }
    }

    fn print_notes(&self) {
        let notes = self.notes.notes();
        if notes.is_empty() {
            println!("no notes yet; use `new`");
            return;
        }
        let active = self.notes.active_note_id();
        for (index, note) in notes.iter().enumerate() {
            let marker = if active.as_ref() == Some(&note.id) { '*' } else { ' ' };
            println!(
                "{marker}{:>3}. {}  [{}]",
                index + 1,
                note.title,
                note.created_at.format("%Y-%m-%d %H:%M")
            );
            if !note.content.is_empty() {
                println!("      {}", note.content);
            }
        }
        info!(
            "event=notes_render module=cli status=ok count={}",
            notes.len()
        );
    }
}
