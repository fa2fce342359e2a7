//! Terminal front end.
//!
//! ARCHITECTURE
//! ============
//! One cooperative loop owns the session router. It selects between input
//! lines, auth notifications and Ctrl-C, so every view change happens on
//! this task. Whenever the view changes the shell prints the new screen,
//! loading dashboard data where the screen has any, followed by the
//! commands that screen accepts.
//!
//! Forms read their fields from the same input, one prompt per field.
//! On an interactive terminal passwords are read from the tty with echo
//! off instead. Notifications that arrive while a form is open queue up and are applied
//! before the form's outcome is committed.

use std::io::Write as _;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::debug;

use crate::backend::models::DiscountType;
use crate::router::{SessionRouter, View};
use crate::services::customer::{self, CustomerDashboard};
use crate::services::login;
use crate::services::restaurant::{self, RestaurantDashboard};
use crate::services::signup::{self, CustomerSignup, RestaurantSignup, SignupError};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("input closed")]
    InputClosed,
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Screens reachable by plain navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Signup,
    Login,
    RestaurantSignup,
    RestaurantLogin,
}

impl Screen {
    fn show(self, router: &SessionRouter) {
        match self {
            Self::Signup => router.show_signup(),
            Self::Login => router.show_login(),
            Self::RestaurantSignup => router.show_restaurant_signup(),
            Self::RestaurantLogin => router.show_restaurant_login(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Goto(Screen),
    /// Open the signup form of the current screen.
    Signup,
    /// Open the login form of the current screen.
    Login,
    Logout,
    Show,
    Qr,
    Link,
    DownloadQr,
    /// Staff input identifying a customer; empty means prompt for it.
    Stamp(String),
    Coupon(String),
}

impl Command {
    /// Parse one input line in the context of `view`. Commands another
    /// screen owns are not accepted.
    #[must_use]
    pub fn parse(view: &View, line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, arg) = line.split_once(char::is_whitespace).map_or((line, ""), |(w, a)| (w, a.trim()));
        let command = match (word, view) {
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            ("signup", View::Signup | View::RestaurantSignup) => Self::Signup,
            ("signup", View::Login) => Self::Goto(Screen::Signup),
            ("signup", View::RestaurantLogin) => Self::Goto(Screen::RestaurantSignup),
            ("login", View::Login | View::RestaurantLogin) => Self::Login,
            ("login", View::Signup) => Self::Goto(Screen::Login),
            ("login", View::RestaurantSignup) => Self::Goto(Screen::RestaurantLogin),
            ("restaurant", View::Signup | View::Login) => Self::Goto(Screen::RestaurantLogin),
            ("restaurant-signup", View::Signup) => Self::Goto(Screen::RestaurantSignup),
            ("customer", View::RestaurantSignup) => Self::Goto(Screen::Signup),
            ("customer", View::RestaurantLogin) => Self::Goto(Screen::Login),
            ("logout", View::Success(_) | View::CustomerDashboard | View::RestaurantDashboard) => Self::Logout,
            ("show", View::CustomerDashboard | View::RestaurantDashboard) => Self::Show,
            ("qr", View::CustomerDashboard) => Self::Qr,
            ("link", View::RestaurantDashboard) => Self::Link,
            ("download-qr", View::RestaurantDashboard) => Self::DownloadQr,
            ("stamp", View::RestaurantDashboard) => Self::Stamp(arg.to_string()),
            ("coupon", View::RestaurantDashboard) => Self::Coupon(arg.to_string()),
            _ => return None,
        };
        Some(command)
    }
}

/// `(command, description)` pairs accepted on `view`, for the help text.
#[must_use]
pub fn commands(view: &View) -> &'static [(&'static str, &'static str)] {
    match view {
        View::Signup => &[
            ("signup", "create a customer account"),
            ("login", "go to customer login"),
            ("restaurant", "go to restaurant login"),
            ("restaurant-signup", "register a restaurant"),
        ],
        View::Login => &[
            ("login", "log in as a customer"),
            ("signup", "go to customer signup"),
            ("restaurant", "go to restaurant login"),
        ],
        View::Success(_) => &[("logout", "sign out")],
        View::CustomerDashboard => &[
            ("show", "reload the dashboard"),
            ("qr", "print the stamp QR link"),
            ("logout", "sign out"),
        ],
        View::RestaurantSignup => &[
            ("signup", "register a restaurant"),
            ("login", "go to restaurant login"),
            ("customer", "go to customer signup"),
        ],
        View::RestaurantLogin => &[
            ("login", "log in as restaurant staff"),
            ("signup", "go to restaurant registration"),
            ("customer", "go to customer login"),
        ],
        View::RestaurantDashboard => &[
            ("show", "reload the dashboard"),
            ("link", "print the signup link and QR image"),
            ("download-qr", "save the QR image to the current directory"),
            ("stamp <code|qr>", "look up a customer and add a stamp"),
            ("coupon <code>", "validate and redeem a coupon"),
            ("logout", "sign out"),
        ],
    }
}

fn print_help(view: &View) {
    for (command, description) in commands(view) {
        println!("  {command:<18} {description}");
    }
    println!("  {:<18} {}", "quit", "exit");
}

fn describe_discount(kind: DiscountType, value: f64) -> String {
    match kind {
        DiscountType::Percentage => format!("{value}% off"),
        DiscountType::Fixed => format!("{value} off"),
        DiscountType::Other => format!("{value}"),
    }
}

// =============================================================================
// SHELL
// =============================================================================

pub struct Shell<R> {
    state: AppState,
    router: SessionRouter,
    input: Lines<R>,
    /// Last screen printed; `None` forces a redraw.
    shown: Option<View>,
    restaurant: Option<RestaurantDashboard>,
    customer: Option<CustomerDashboard>,
    hide_passwords: bool,
}

impl<R: AsyncBufRead + Unpin> Shell<R> {
    #[must_use]
    pub fn new(state: AppState, router: SessionRouter, input: R) -> Self {
        Self {
            state,
            router,
            input: input.lines(),
            shown: None,
            restaurant: None,
            customer: None,
            hide_passwords: false,
        }
    }

    /// Read password fields from the controlling terminal without echo.
    #[must_use]
    pub fn with_hidden_passwords(mut self, hide: bool) -> Self {
        self.hide_passwords = hide;
        self
    }

    #[must_use]
    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Run until `quit`, end of input or Ctrl-C. The router is unmounted on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error if reading input or writing output fails.
    pub async fn run(&mut self) -> Result<(), ShellError> {
        let result = self.event_loop().await;
        self.router.unmount();
        result
    }

    async fn event_loop(&mut self) -> Result<(), ShellError> {
        loop {
            self.render().await;
            tokio::select! {
                line = self.input.next_line() => {
                    let Some(line) = line? else {
                        return Ok(());
                    };
                    match self.dispatch(&line).await {
                        Ok(true) => {}
                        Ok(false) | Err(ShellError::InputClosed) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
                Some(change) = self.router.next_auth_change(), if self.router.is_subscribed() => {
                    debug!(event = ?change.event, "auth notification");
                    self.router.handle_auth_change(change).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    return Ok(());
                }
            }
        }
    }

    async fn render(&mut self) {
        loop {
            let view = self.router.view();
            if self.shown.as_ref() == Some(&view) {
                return;
            }
            self.shown = Some(view.clone());
            println!();
            match &view {
                View::Signup => println!("== Customer signup =="),
                View::Login => println!("== Customer login =="),
                View::Success(display) => {
                    println!("== Welcome, {}! ==", display.first_name);
                    println!("Your welcome coupon: {}", display.code);
                    println!("Show this code at the restaurant to redeem it.");
                }
                View::CustomerDashboard => self.show_customer().await,
                View::RestaurantSignup => println!("== Restaurant registration =="),
                View::RestaurantLogin => println!("== Restaurant login =="),
                View::RestaurantDashboard => self.show_restaurant().await,
            }
            if self.router.view() == view {
                print_help(&view);
            }
        }
    }

    /// Handle one line. `Ok(false)` ends the loop.
    async fn dispatch(&mut self, line: &str) -> Result<bool, ShellError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(true);
        }
        let view = self.router.view();
        let Some(command) = Command::parse(&view, line) else {
            println!("unknown command `{line}`; type `help`");
            return Ok(true);
        };

        match command {
            Command::Help => print_help(&view),
            Command::Quit => return Ok(false),
            Command::Goto(screen) => screen.show(&self.router),
            Command::Signup if view == View::RestaurantSignup => self.restaurant_signup_form().await?,
            Command::Signup => self.customer_signup_form().await?,
            Command::Login if view == View::RestaurantLogin => self.restaurant_login_form().await?,
            Command::Login => self.customer_login_form().await?,
            Command::Logout if view == View::RestaurantDashboard => {
                self.restaurant = None;
                restaurant::log_out(&self.state, &mut self.router).await;
            }
            Command::Logout => {
                self.customer = None;
                customer::log_out(&self.state, &mut self.router).await;
            }
            Command::Show => self.shown = None,
            Command::Qr => self.print_customer_qr(),
            Command::Link => self.print_restaurant_link(),
            Command::DownloadQr => self.download_qr().await?,
            Command::Stamp(input) => self.stamp(input).await?,
            Command::Coupon(code) => self.coupon(code).await?,
        }
        Ok(true)
    }

    async fn prompt(&mut self, label: &str) -> Result<String, ShellError> {
        print!("{label}: ");
        std::io::stdout().flush()?;
        let line = self.input.next_line().await?.ok_or(ShellError::InputClosed)?;
        Ok(line.trim().to_string())
    }

    async fn prompt_password(&mut self) -> Result<String, ShellError> {
        if !self.hide_passwords {
            return self.prompt("password").await;
        }
        let read = tokio::task::spawn_blocking(|| rpassword::prompt_password("password: "))
            .await
            .map_err(std::io::Error::other)?;
        match read {
            Ok(password) => Ok(password.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ShellError::InputClosed),
            Err(e) => Err(e.into()),
        }
    }

    async fn confirm(&mut self, label: &str) -> Result<bool, ShellError> {
        let answer = self.prompt(&format!("{label} [y/N]")).await?;
        Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
    }

    // =========================================================================
    // FORMS
    // =========================================================================

    async fn customer_signup_form(&mut self) -> Result<(), ShellError> {
        let restaurants = match signup::available_restaurants(&self.state).await {
            Ok(restaurants) => restaurants,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };
        let slug = self.router.location().restaurant.clone();
        let Some(default_id) = signup::preselect(&restaurants, slug.as_deref()).map(|r| r.id) else {
            println!("{}", SignupError::NoRestaurant);
            return Ok(());
        };

        let mut default_index = 0;
        for (i, r) in restaurants.iter().enumerate() {
            if r.id == default_id {
                default_index = i;
            }
            match &r.location {
                Some(location) => println!("  {}) {} ({location})", i + 1, r.name),
                None => println!("  {}) {}", i + 1, r.name),
            }
        }
        let choice = self.prompt(&format!("restaurant [{}]", default_index + 1)).await?;
        let restaurant_id = if choice.is_empty() {
            default_id
        } else {
            let picked = choice
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| restaurants.get(i));
            let Some(picked) = picked else {
                println!("no restaurant numbered `{choice}`");
                return Ok(());
            };
            picked.id
        };

        let form = CustomerSignup {
            name: self.prompt("name").await?,
            email: self.prompt("email").await?,
            phone: self.prompt("phone").await?,
            password: self.prompt_password().await?,
            restaurant_id,
        };
        match signup::sign_up_customer(&self.state, &mut self.router, &form).await {
            Ok(receipt) if !receipt.stamp_card => println!("Account created. This restaurant has no stamp card yet."),
            Ok(_) => println!("Account created."),
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    async fn restaurant_signup_form(&mut self) -> Result<(), ShellError> {
        let form = RestaurantSignup {
            name: self.prompt("restaurant name").await?,
            location: self.prompt("location").await?,
            owner_name: self.prompt("owner name").await?,
            email: self.prompt("email").await?,
            phone: self.prompt("phone").await?,
            password: self.prompt_password().await?,
        };
        match signup::sign_up_restaurant(&self.state, &mut self.router, &form).await {
            Ok(restaurant) => println!("Restaurant `{}` registered.", restaurant.slug),
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    async fn customer_login_form(&mut self) -> Result<(), ShellError> {
        let email = self.prompt("email").await?;
        let password = self.prompt_password().await?;
        if let Err(e) = login::log_in_customer(&self.state, &mut self.router, &email, &password).await {
            println!("{e}");
        }
        Ok(())
    }

    async fn restaurant_login_form(&mut self) -> Result<(), ShellError> {
        let email = self.prompt("email").await?;
        let password = self.prompt_password().await?;
        if let Err(e) = login::log_in_restaurant(&self.state, &mut self.router, &email, &password).await {
            println!("{e}");
        }
        Ok(())
    }

    // =========================================================================
    // CUSTOMER DASHBOARD
    // =========================================================================

    async fn show_customer(&mut self) {
        let dashboard = match customer::load(&self.state, &mut self.router).await {
            Ok(dashboard) => dashboard,
            Err(e) => {
                println!("{e}");
                return;
            }
        };

        let c = &dashboard.customer;
        println!("== {} ==", c.name);
        if let Some(code) = &c.redemption_code {
            println!("Your code: {code}");
        }

        println!("Coupons:");
        if dashboard.active_coupons.is_empty() {
            println!("  none active");
        }
        for coupon in &dashboard.active_coupons {
            println!(
                "  {}  {}  valid until {}",
                coupon.code,
                describe_discount(coupon.discount_type, coupon.discount_value),
                coupon.expires_at.date()
            );
        }
        if !dashboard.used_coupons.is_empty() {
            println!("  ({} redeemed)", dashboard.used_coupons.len());
        }

        for card in &dashboard.stamp_cards {
            match &card.program {
                Some(program) => {
                    println!("{}: {}/{} stamps", program.name, card.current_stamps, program.stamps_required);
                    if let Some(reward) = &program.reward_value {
                        println!("  {} more for {reward}", card.stamps_remaining().unwrap_or(0));
                    }
                }
                None => println!("Stamp card: {} stamps", card.current_stamps),
            }
        }

        if !dashboard.stamp_history.is_empty() {
            println!("Recent stamps:");
            for entry in &dashboard.stamp_history {
                match &entry.notes {
                    Some(note) => println!("  {}  {note}", entry.created_at.date()),
                    None => println!("  {}", entry.created_at.date()),
                }
            }
        }
        self.customer = Some(dashboard);
    }

    fn print_customer_qr(&self) {
        let Some(dashboard) = &self.customer else {
            println!("dashboard not loaded; type `show`");
            return;
        };
        match dashboard.stamp_qr_url() {
            Ok(url) => println!("Show this QR code to collect a stamp:\n  {url}"),
            Err(e) => println!("{e}"),
        }
    }

    // =========================================================================
    // RESTAURANT DASHBOARD
    // =========================================================================

    async fn show_restaurant(&mut self) {
        let dashboard = match restaurant::load(&self.state, &mut self.router).await {
            Ok(dashboard) => dashboard,
            Err(e) => {
                println!("{e}");
                self.restaurant = None;
                return;
            }
        };

        let stats = dashboard.stats;
        println!("== {} ==", dashboard.restaurant.name);
        println!(
            "customers {}  stamps {}  coupons {}  redeemed {}",
            stats.total_customers, stats.total_stamps, stats.total_coupons, stats.redeemed_coupons
        );
        for entry in &dashboard.customers {
            let code = entry.customer.redemption_code.as_deref().unwrap_or("------");
            println!("  {code}  {:<24} {} stamps", entry.customer.name, entry.stamp_count);
        }
        self.restaurant = Some(dashboard);
    }

    fn print_restaurant_link(&self) {
        let Some(dashboard) = &self.restaurant else {
            println!("dashboard not loaded; type `show`");
            return;
        };
        let public_url = &self.state.config.public_url;
        println!("Signup link: {}", dashboard.signup_url(public_url));
        match dashboard.qr_image_url(public_url) {
            Ok(url) => println!("QR image:    {url}"),
            Err(e) => println!("{e}"),
        }
    }

    async fn download_qr(&self) -> Result<(), ShellError> {
        let Some(dashboard) = &self.restaurant else {
            println!("dashboard not loaded; type `show`");
            return Ok(());
        };
        let dir = std::env::current_dir()?;
        match dashboard.download_qr(&self.state, &dir).await {
            Ok(path) => println!("Saved {}", path.display()),
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    async fn stamp(&mut self, input: String) -> Result<(), ShellError> {
        let Some(restaurant_id) = self.restaurant.as_ref().map(|d| d.restaurant.id) else {
            println!("dashboard not loaded; type `show`");
            return Ok(());
        };
        let input = if input.is_empty() { self.prompt("6-digit code or QR data").await? } else { input };

        let found = match restaurant::find_customer(&self.state, restaurant_id, &input).await {
            Ok(found) => found,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };
        println!("{} has {} stamps here.", found.customer.name, found.stamp_count);
        let note = self.prompt("note (optional)").await?;
        if !self.confirm("add stamp?").await? {
            println!("cancelled");
            return Ok(());
        }

        match restaurant::add_stamp(&self.state, found.customer.id, Some(&note)).await {
            Ok(result) => {
                println!("{}", result.message);
                if let Some(reward) = result.reward {
                    println!("Reward coupon {}: {}", reward.coupon_code, reward.reward_value);
                }
                self.shown = None;
            }
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    async fn coupon(&mut self, code: String) -> Result<(), ShellError> {
        let Some(restaurant_id) = self.restaurant.as_ref().map(|d| d.restaurant.id) else {
            println!("dashboard not loaded; type `show`");
            return Ok(());
        };
        let code = if code.is_empty() { self.prompt("coupon code").await? } else { code };

        let coupon = match restaurant::validate_coupon(&self.state, restaurant_id, &code).await {
            Ok(coupon) => coupon,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };
        println!(
            "{}  {}  valid until {}",
            coupon.code,
            describe_discount(coupon.discount_type, coupon.discount_value),
            coupon.expires_at.date()
        );
        if let Some(holder) = &coupon.customer {
            println!("issued to {}", holder.name);
        }
        if !self.confirm("redeem now?").await? {
            println!("cancelled");
            return Ok(());
        }

        match restaurant::redeem_coupon(&self.state, restaurant_id, &coupon).await {
            Ok(()) => {
                println!("Coupon redeemed.");
                self.shown = None;
            }
            Err(e) => println!("{e}"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "shell_test.rs"]
mod tests;
