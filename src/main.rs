use anyhow::{anyhow, Result};
use derive_more::Display;
use inquire::{Confirm, Password, Select, Text};
use log::info;
use medagenda::accounts::{AccountService, Session};
use medagenda::booking::{time_slots, BookingService};
use medagenda::config::Config;
use medagenda::models::*;
use medagenda::statistics::{Statistics, StatisticsService};
use medagenda::storage::StorageService;
use medagenda::store::FileStore;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use tokio::runtime::Runtime;

const BACKUP_FILE: &str = "medagenda-backup.json";
const ADMIN_NAME: &str = "Administrador";

type MenuExit = Option<()>;
const MENU_EXIT: MenuExit = None;
const MENU_LOOP: MenuExit = Some(());

/// Représente un menu texte
trait Menu {
    /// Implémente le contenu du menu. La valeur de retour
    /// doit être None si le menu souhaite terminer,
    /// ou Some(()) s'il faut le relancer.
    fn enter(&mut self) -> Result<MenuExit>;

    /// Lance le menu en boucle, en interceptant les erreurs,
    /// sauf si le menu souhaite quitter.
    fn enter_loop(&mut self) {
        while let Some(result) = self.enter().transpose() {
            if let Err(error) = result {
                eprintln!("Erreur: {error}");
            }
        }
    }
}

pub struct App {
    rt: Runtime,
    storage: StorageService,
}

impl App {
    pub fn new(rt: Runtime, storage: StorageService) -> Self {
        App { rt, storage }
    }

    pub fn start(&mut self) -> Result<()> {
        println!("Bienvenue sur MedAgenda, la prise de rendez-vous médicaux.");
        self.enter_loop();
        Ok(())
    }

    fn open_session(&self, session: Session) {
        eprintln!("[*] Bienvenue, {}.", session.user.name);
        UserMenu {
            rt: &self.rt,
            storage: &self.storage,
            session,
        }
        .enter_loop();
    }
}

/// Un mot de passe masqué, à saisir deux fois si `confirm` est vrai
fn password_prompt(message: &str, confirm: bool) -> Password<'_> {
    let prompt = Password::new(message).with_display_mode(inquire::PasswordDisplayMode::Masked);
    if confirm {
        prompt
    } else {
        prompt.without_confirmation()
    }
}

fn prompt_password(message: &str, confirm: bool) -> Result<String> {
    Ok(password_prompt(message, confirm).prompt()?)
}

impl Menu for App {
    fn enter(&mut self) -> Result<MenuExit> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Créer un compte patient")]
            Register,
            #[display("Se connecter")]
            SignIn,
            #[display("Quitter")]
            Exit,
        }

        let choice = Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()?;
        let accounts = AccountService::new(&self.storage);

        match choice {
            Choice::Register => {
                let name = Text::new("Nom complet: ").prompt()?;
                let email = Text::new("Email: ").prompt()?;
                let password = prompt_password("Mot de passe: ", true)?;

                let session = self.rt.block_on(accounts.register(&name, &email, &password))?;
                self.open_session(session);
                Ok(MENU_LOOP)
            }
            Choice::SignIn => {
                let email = Text::new("Email: ").prompt()?;
                let password = prompt_password("Mot de passe: ", false)?;

                let session = self.rt.block_on(accounts.sign_in(&email, &password))?;
                self.open_session(session);
                Ok(MENU_LOOP)
            }
            Choice::Exit => Ok(MENU_EXIT),
        }
    }
}

struct UserMenu<'app> {
    rt: &'app Runtime,
    storage: &'app StorageService,
    session: Session,
}

fn print_statistics(stats: &Statistics) {
    let p = &stats.status_percentages;
    println!("Rendez-vous: {}", stats.total_appointments);
    println!("  confirmés: {} ({:.1}%)", stats.confirmed_appointments, p.confirmed);
    println!("  en attente: {} ({:.1}%)", stats.pending_appointments, p.pending);
    println!("  annulés: {} ({:.1}%)", stats.cancelled_appointments, p.cancelled);

    if let Some(patients) = stats.total_patients {
        println!("Patients: {patients}");
    }
    if let Some(doctors) = stats.total_doctors {
        println!("Médecins: {doctors}");
    }
    if let Some(specialties) = &stats.specialties {
        println!("Par spécialité:");
        for (specialty, count) in specialties {
            println!("  {specialty}: {count}");
        }
    }
    if let Some(months) = &stats.appointments_by_month {
        println!("Par mois:");
        for (month, count) in months {
            println!("  {month}: {count}");
        }
    }
}

fn print_appointments(appointments: &[Appointment]) {
    if appointments.is_empty() {
        println!("[*] Aucun rendez-vous");
    }
    for a in appointments {
        println!(
            "[{}] {} {} - {} avec {} ({}) - {}",
            a.id, a.date, a.time, a.patient_name, a.doctor_name, a.specialty, a.status
        );
    }
}

impl UserMenu<'_> {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.rt.block_on(future)
    }

    fn user(&self) -> &User {
        &self.session.user
    }

    fn sign_out(&self) -> Result<MenuExit> {
        self.block_on(AccountService::new(self.storage).sign_out())?;
        info!("{} signed out", self.user().email);
        Ok(MENU_EXIT)
    }

    fn show_notifications(&self) -> Result<()> {
        let booking = BookingService::new(self.storage);
        let notifications = self.block_on(booking.notifications_of(&self.user().id))?;
        if notifications.is_empty() {
            println!("[*] Aucune notification");
        }
        for notification in &notifications {
            let marker = if notification.read { " " } else { "*" };
            println!("[{marker}] {notification}");
        }
        for notification in notifications.iter().filter(|n| !n.read) {
            self.block_on(booking.mark_as_read(&notification.id))?;
        }
        Ok(())
    }

    fn edit_profile(&mut self) -> Result<()> {
        let current = self.user().clone();
        let name = Text::new("Nom complet:").with_default(&current.name).prompt()?;
        let email = Text::new("Email:").with_default(&current.email).prompt()?;
        let specialty = match current.specialty() {
            Some(specialty) => Some(Text::new("Spécialité:").with_default(specialty).prompt()?),
            None => None,
        };

        let updated = self.block_on(AccountService::new(self.storage).update_profile(
            &current,
            &name,
            &email,
            specialty.as_deref(),
        ))?;
        println!("[*] Profil mis à jour: {updated}");
        self.session.user = updated;
        Ok(())
    }

    fn own_appointments(&self) -> Result<Vec<Appointment>> {
        Ok(self.block_on(BookingService::new(self.storage).appointments_of(self.user()))?)
    }

    fn patient_menu(&mut self) -> Result<MenuExit> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Prendre rendez-vous")]
            Book,
            #[display("Mes rendez-vous")]
            Appointments,
            #[display("Mes statistiques")]
            Statistics,
            #[display("Mes notifications")]
            Notifications,
            #[display("Modifier mon profil")]
            EditProfile,
            #[display("Se déconnecter")]
            SignOut,
        }

        let unread = self.block_on(BookingService::new(self.storage).unread_count(&self.user().id))?;
        let prompt = format!("Que voulez-vous faire ? ({unread} notification(s) non lue(s))");
        match Select::new(&prompt, Choice::iter().collect()).prompt()? {
            Choice::Book => {
                let doctors = self.block_on(AccountService::new(self.storage).doctors())?;
                if doctors.is_empty() {
                    println!("[!] Aucun médecin disponible");
                    return Ok(MENU_LOOP);
                }
                let doctor = Select::new("Choisissez un médecin:", doctors).prompt()?;
                let date = Text::new("Date (JJ/MM/AAAA):").prompt()?;
                let time = Select::new("Créneau:", time_slots()).prompt()?;

                let appointment = self.block_on(BookingService::new(self.storage).book(
                    self.user(),
                    &doctor,
                    &date,
                    &time,
                ))?;
                println!("[*] Rendez-vous demandé: {appointment}");
            }
            Choice::Appointments => print_appointments(&self.own_appointments()?),
            Choice::Statistics => {
                let stats = self.block_on(StatisticsService::new(self.storage).for_patient(&self.user().id))?;
                print_statistics(&stats);
            }
            Choice::Notifications => self.show_notifications()?,
            Choice::EditProfile => self.edit_profile()?,
            Choice::SignOut => return self.sign_out(),
        }
        Ok(MENU_LOOP)
    }

    fn doctor_menu(&mut self) -> Result<MenuExit> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Traiter les demandes en attente")]
            Pending,
            #[display("Mes rendez-vous")]
            Appointments,
            #[display("Mes statistiques")]
            Statistics,
            #[display("Mes notifications")]
            Notifications,
            #[display("Modifier mon profil")]
            EditProfile,
            #[display("Se déconnecter")]
            SignOut,
        }

        #[derive(EnumIter, Display)]
        enum Decision {
            #[display("Confirmer")]
            Confirm,
            #[display("Annuler le rendez-vous")]
            Cancel,
        }

        match Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()? {
            Choice::Pending => {
                let pending: Vec<Appointment> = self
                    .own_appointments()?
                    .into_iter()
                    .filter(|a| a.status == AppointmentStatus::Pending)
                    .collect();
                if pending.is_empty() {
                    println!("[*] Aucune demande en attente");
                    return Ok(MENU_LOOP);
                }

                let Some(appointment) = Select::new("Choisissez un rendez-vous:", pending).prompt_skippable()?
                else {
                    return Ok(MENU_LOOP);
                };
                let booking = BookingService::new(self.storage);
                let updated = match Select::new("Décision:", Decision::iter().collect()).prompt()? {
                    Decision::Confirm => self.block_on(booking.confirm(appointment.id.as_str()))?,
                    Decision::Cancel => self.block_on(booking.cancel(appointment.id.as_str()))?,
                };
                println!("[*] {updated}");
            }
            Choice::Appointments => print_appointments(&self.own_appointments()?),
            Choice::Statistics => {
                let stats = self.block_on(StatisticsService::new(self.storage).for_doctor(&self.user().id))?;
                print_statistics(&stats);
            }
            Choice::Notifications => self.show_notifications()?,
            Choice::EditProfile => self.edit_profile()?,
            Choice::SignOut => return self.sign_out(),
        }
        Ok(MENU_LOOP)
    }

    fn admin_menu(&mut self) -> Result<MenuExit> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Statistiques générales")]
            Statistics,
            #[display("Tous les rendez-vous")]
            Appointments,
            #[display("Créer un compte médecin")]
            CreateDoctor,
            #[display("Sauvegarder les données")]
            Backup,
            #[display("Restaurer une sauvegarde")]
            Restore,
            #[display("État du stockage")]
            StorageInfo,
            #[display("Vider le cache")]
            ClearCache,
            #[display("Préférences")]
            Settings,
            #[display("Modifier mon profil")]
            EditProfile,
            #[display("Se déconnecter")]
            SignOut,
        }

        match Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()? {
            Choice::Statistics => {
                let stats = self.block_on(StatisticsService::new(self.storage).general())?;
                print_statistics(&stats);
            }
            Choice::Appointments => print_appointments(&self.block_on(self.storage.appointments())?),
            Choice::CreateDoctor => {
                let name = Text::new("Nom du médecin: ").prompt()?;
                let email = Text::new("Email: ").prompt()?;
                let specialty = Text::new("Spécialité: ").prompt()?;
                let password = prompt_password("Mot de passe initial: ", true)?;

                let doctor = self.block_on(AccountService::new(self.storage).register_doctor(
                    &name, &email, &password, &specialty,
                ))?;
                println!("[*] Compte créé pour {doctor}");
            }
            Choice::Backup => {
                let path = Text::new("Fichier de sauvegarde:")
                    .with_default(BACKUP_FILE)
                    .prompt()?;
                let blob = self.block_on(self.storage.create_backup())?;
                std::fs::write(&path, blob)?;
                println!("[*] Sauvegarde écrite dans {path}");
            }
            Choice::Restore => {
                let path = Text::new("Fichier de sauvegarde:")
                    .with_default(BACKUP_FILE)
                    .prompt()?;
                let blob = std::fs::read_to_string(&path)
                    .map_err(|e| anyhow!("Lecture de {path} impossible: {e}"))?;
                if Confirm::new("Remplacer toutes les données actuelles ?")
                    .with_default(false)
                    .prompt()?
                {
                    self.block_on(self.storage.restore_from_backup(&blob))?;
                    println!("[*] Sauvegarde restaurée");
                }
            }
            Choice::StorageInfo => {
                let info = self.block_on(self.storage.storage_info())?;
                println!("Clés stockées: {}\nEntrées en cache: {}", info.total_keys, info.cache_size);
                for (key, written_at) in &info.last_access {
                    println!("  {key}: {written_at}");
                }
            }
            Choice::ClearCache => {
                self.block_on(self.storage.clear_cache());
                println!("[*] Cache vidé");
            }
            Choice::Settings => {
                let current = self.block_on(self.storage.app_settings())?;
                let theme = Select::new("Thème:", vec![Theme::Light, Theme::Dark])
                    .with_starting_cursor(if current.theme == Theme::Dark { 1 } else { 0 })
                    .prompt()?;
                let notifications = Confirm::new("Activer les notifications ?")
                    .with_default(current.notifications)
                    .prompt()?;
                let language = Text::new("Langue:")
                    .with_default(&current.language)
                    .prompt()?;
                let auto_backup = Confirm::new("Sauvegarde automatique ?")
                    .with_default(current.auto_backup)
                    .prompt()?;

                self.block_on(self.storage.update_app_settings(&json!({
                    "theme": theme,
                    "notifications": notifications,
                    "language": language,
                    "autoBackup": auto_backup,
                })))?;
            }
            Choice::EditProfile => self.edit_profile()?,
            Choice::SignOut => return self.sign_out(),
        }
        Ok(MENU_LOOP)
    }
}

impl Menu for UserMenu<'_> {
    fn enter(&mut self) -> Result<MenuExit> {
        match self.session.user.role {
            Role::Patient => self.patient_menu(),
            Role::Doctor { .. } => self.doctor_menu(),
            Role::Admin => self.admin_menu(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    simple_logging::log_to_file(&config.log_file, config.log_level)?;

    let rt = Runtime::new()?;
    let storage = StorageService::new(Arc::new(FileStore::open(config.data_file.clone())?));

    if let Some(admin) = &config.admin {
        rt.block_on(AccountService::new(&storage).ensure_admin(
            ADMIN_NAME,
            &admin.email,
            &admin.password,
        ))?;
    }

    App::new(rt, storage).start()
}
