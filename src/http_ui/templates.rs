use chrono::DateTime;
use hyper::StatusCode;
use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::auth::UserRecord;

/// Base HTML layout. `current_user` switches the nav between the
/// signup/login links and the logout button.
fn layout(title: &str, current_user: Option<&UserRecord>, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                style { (PreEscaped(STYLES)) }
            }
            body {
                header {
                    h1 { a href="/" { "Session Auth" } }
                    nav {
                        @if let Some(user) = current_user {
                            a href="/users/user-page" { (user.username) }
                            " | "
                            a href="/users/main" { "Main" }
                            " | "
                            a href="/users/private" { "Private" }
                            " | "
                            form method="post" action="/logout" class="inline-form" {
                                button type="submit" class="logout-button" { "Logout" }
                            }
                        } @else {
                            a href="/signup" { "Sign up" }
                            " | "
                            a href="/login" { "Log in" }
                        }
                    }
                }
                main {
                    (content)
                }
                footer {
                    p { "session-auth v" (env!("CARGO_PKG_VERSION")) }
                }
            }
        }
    }
}

fn error_alert(error: Option<&str>) -> Markup {
    html! {
        @if let Some(err) = error {
            div class="alert alert-error" {
                (err)
            }
        }
    }
}

fn member_since(user: &UserRecord) -> String {
    DateTime::from_timestamp(user.created_at, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Home page
pub fn home_page(current_user: Option<&UserRecord>) -> String {
    let content = html! {
        div class="page-header" {
            h2 { "Welcome" }
        }
        @if let Some(user) = current_user {
            p { "You are logged in as " strong { (user.username) } "." }
            p { a href="/users/user-page" { "Go to your page" } }
        } @else {
            p { "Create an account or log in to see the private pages." }
            p {
                a href="/signup" class="btn btn-primary" { "Sign up" }
                " "
                a href="/login" class="btn" { "Log in" }
            }
        }
    };

    layout("Home - Session Auth", current_user, content).into_string()
}

/// Signup form. `username` is echoed back on re-render.
pub fn signup_page(error: Option<&str>, username: Option<&str>) -> String {
    let content = html! {
        div class="login-container" {
            div class="login-box" {
                h2 { "Sign up" }

                (error_alert(error))

                form method="POST" action="/signup" {
                    div class="form-group" {
                        label for="username" { "Username" }
                        input type="text" id="username" name="username" autofocus
                            value=(username.unwrap_or_default());
                    }

                    div class="form-group" {
                        label for="password" { "Password" }
                        input type="password" id="password" name="password";
                        small { "At least 6 characters with a number, a lowercase and an uppercase letter" }
                    }

                    button type="submit" class="btn btn-primary" { "Create account" }
                }

                p class="form-switch" {
                    "Already registered? " a href="/login" { "Log in" }
                }
            }
        }
    };

    layout("Sign up - Session Auth", None, content).into_string()
}

/// Login form
pub fn login_page(error: Option<&str>, username: Option<&str>) -> String {
    let content = html! {
        div class="login-container" {
            div class="login-box" {
                h2 { "Login" }

                (error_alert(error))

                form method="POST" action="/login" {
                    div class="form-group" {
                        label for="username" { "Username" }
                        input type="text" id="username" name="username" autofocus
                            value=(username.unwrap_or_default());
                    }

                    div class="form-group" {
                        label for="password" { "Password" }
                        input type="password" id="password" name="password";
                    }

                    button type="submit" class="btn btn-primary" { "Login" }
                }

                p class="form-switch" {
                    "No account yet? " a href="/signup" { "Sign up" }
                }
            }
        }
    };

    layout("Login - Session Auth", None, content).into_string()
}

/// Landing page for the logged-in user
pub fn user_page(user: &UserRecord) -> String {
    let content = html! {
        div class="page-header" {
            h2 { "Hello, " (user.username) "!" }
        }

        table class="profile-table" {
            tbody {
                tr {
                    th { "Username" }
                    td { (user.username) }
                }
                tr {
                    th { "Member since" }
                    td { (member_since(user)) }
                }
            }
        }
    };

    layout("Your page - Session Auth", Some(user), content).into_string()
}

/// Members-only main page
pub fn main_page(current_user: Option<&UserRecord>) -> String {
    let content = html! {
        div class="page-header" {
            h2 { "Main" }
        }
        p { "This page is only visible to logged-in users." }
    };

    layout("Main - Session Auth", current_user, content).into_string()
}

/// Members-only private page
pub fn private_page(current_user: Option<&UserRecord>) -> String {
    let content = html! {
        div class="page-header" {
            h2 { "Private" }
        }
        p { "Private content for members." }
    };

    layout("Private - Session Auth", current_user, content).into_string()
}

/// Error page
pub fn error_page(status: StatusCode, message: &str) -> String {
    let content = html! {
        div class="error-page" {
            h2 { (status.as_u16()) " " (status.canonical_reason().unwrap_or("Error")) }
            p { (message) }
            p {
                a href="/" { "← Back home" }
            }
        }
    };

    layout("Error - Session Auth", None, content).into_string()
}

const STYLES: &str = r#"
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    margin: 0;
    color: #333;
    background: #f5f5f5;
}

header {
    background: #2c3e50;
    color: white;
    padding: 1rem 2rem;
    display: flex;
    justify-content: space-between;
    align-items: center;
}

header h1 {
    margin: 0;
    font-size: 1.5rem;
}

header a {
    color: white;
    text-decoration: none;
}

nav a:hover {
    text-decoration: underline;
}

main {
    max-width: 960px;
    margin: 2rem auto;
    padding: 0 2rem;
}

footer {
    text-align: center;
    color: #888;
    font-size: 0.85em;
    padding: 1rem;
}

.inline-form {
    display: inline;
}

.logout-button {
    background: none;
    border: 1px solid white;
    color: white;
    padding: 0.25rem 0.75rem;
    border-radius: 4px;
    cursor: pointer;
}

.page-header {
    display: flex;
    justify-content: space-between;
    align-items: center;
    margin-bottom: 1.5rem;
}

.login-container {
    display: flex;
    justify-content: center;
}

.login-box {
    background: white;
    padding: 2rem;
    border-radius: 8px;
    box-shadow: 0 2px 8px rgba(0, 0, 0, 0.1);
    width: 100%;
    max-width: 400px;
}

.form-group {
    margin-bottom: 1rem;
}

.form-group label {
    display: block;
    margin-bottom: 0.25rem;
    font-weight: 600;
}

.form-group input {
    width: 100%;
    padding: 0.5rem;
    border: 1px solid #ccc;
    border-radius: 4px;
    box-sizing: border-box;
}

.form-group small {
    color: #666;
}

.form-switch {
    margin-top: 1rem;
    font-size: 0.9em;
}

.btn {
    display: inline-block;
    padding: 0.5rem 1rem;
    border: 1px solid #007bff;
    border-radius: 4px;
    color: #007bff;
    background: white;
    text-decoration: none;
    cursor: pointer;
}

.btn-primary {
    background: #007bff;
    color: white;
}

.alert {
    padding: 0.75rem 1rem;
    border-radius: 4px;
    margin-bottom: 1rem;
}

.alert-error {
    background: #f8d7da;
    color: #721c24;
    border: 1px solid #f5c6cb;
}

.profile-table th {
    text-align: left;
    padding-right: 2rem;
}

.error-page {
    text-align: center;
}
"#;
