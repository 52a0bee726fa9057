//! recon-admin: headless admin console for the reconciliation core.
//!
//! Usage:
//!   recon-admin --db recon.db --seed-demo
//!   recon-admin --db recon.db --scan
//!   recon-admin --db recon.db --ipc-mode

use anyhow::Result;
use chrono::{DateTime, Utc};
use recon_core::{
    config::ReconConfig,
    engine::ReconEngine,
    payment::PaymentKind,
    store::{PaymentRow, PaymentStats, ServiceRow},
    tranche::Decision,
    types::Role,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    CreatePayment {
        account_id: String,
        service_id: String,
        kind: PaymentKind,
        transaction_ref: String,
    },
    SubmitTranche {
        payment_id: String,
        installment_number: u32,
        transaction_ref: String,
    },
    AdjudicateTranche {
        payment_id: String,
        installment_number: u32,
        decision: Decision,
        notes: Option<String>,
    },
    MarkTranchePaid {
        payment_id: String,
        installment_number: u32,
    },
    SetServiceWindow {
        payment_id: String,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    },
    RunScan,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    payments: Vec<PaymentRow>,
    stats: PaymentStats,
    suspicious_accounts: i64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let config_path = args.windows(2).find(|w| w[0] == "--config").map(|w| w[1].as_str());
    let seed_demo = args.iter().any(|a| a == "--seed-demo");
    let scan = args.iter().any(|a| a == "--scan");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");

    let config = match config_path {
        Some(path) => ReconConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ReconConfig::default(),
    };

    if !ipc_mode {
        println!("recon-admin");
        println!("  db: {db}");
        println!();
    }

    let engine = ReconEngine::open(db, config)?;

    if seed_demo {
        seed_demo_data(&engine)?;
    }

    if scan {
        let flagged = engine.run_suspicion_scan(Utc::now())?;
        println!("suspicion scan flagged {} account(s)", flagged.len());
        for account_id in &flagged {
            println!("  {account_id}");
        }
    }

    if ipc_mode {
        run_ipc_loop(&engine)?;
    } else {
        print_summary(&engine)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &ReconEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            other => match handle_command(engine, other) {
                Ok(()) => {
                    let state = build_ui_state(engine)?;
                    writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
                }
                Err(e) => {
                    let err_json = serde_json::json!({ "error": e.to_string() });
                    writeln!(stdout, "{err_json}")?;
                }
            },
        }
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &ReconEngine, cmd: IpcCommand) -> Result<()> {
    match cmd {
        IpcCommand::GetState | IpcCommand::Quit => {}
        IpcCommand::CreatePayment {
            account_id,
            service_id,
            kind,
            transaction_ref,
        } => {
            let payment = engine.create_payment(&account_id, &service_id, kind, &transaction_ref)?;
            log::info!("created payment {}", payment.payment_id);
        }
        IpcCommand::SubmitTranche {
            payment_id,
            installment_number,
            transaction_ref,
        } => {
            engine.submit_tranche(&payment_id, installment_number, &transaction_ref)?;
        }
        IpcCommand::AdjudicateTranche {
            payment_id,
            installment_number,
            decision,
            notes,
        } => {
            engine.adjudicate_tranche(&payment_id, installment_number, decision, notes.as_deref())?;
        }
        IpcCommand::MarkTranchePaid {
            payment_id,
            installment_number,
        } => {
            engine.mark_tranche_paid(&payment_id, installment_number)?;
        }
        IpcCommand::SetServiceWindow {
            payment_id,
            start_date,
            end_date,
        } => {
            engine.set_service_window(&payment_id, start_date, end_date)?;
        }
        IpcCommand::RunScan => {
            let flagged = engine.run_suspicion_scan(Utc::now())?;
            log::info!("scan flagged {} account(s)", flagged.len());
        }
    }
    Ok(())
}

fn build_ui_state(engine: &ReconEngine) -> Result<UiState> {
    Ok(UiState {
        payments: engine.store.all_payments()?,
        stats: engine.payment_stats()?,
        suspicious_accounts: engine.store.count_suspicious_accounts()?,
    })
}

fn seed_demo_data(engine: &ReconEngine) -> Result<()> {
    let admin = engine.create_account(Role::Administrator)?;
    let alice = engine.create_account(Role::Customer)?;
    let bob = engine.create_account(Role::Customer)?;

    engine.upsert_service(&ServiceRow {
        service_id: "svc-website".into(),
        name: "Website development".into(),
        price: 25_000,
        duration_label: "3 months".into(),
    })?;
    engine.upsert_service(&ServiceRow {
        service_id: "svc-seo".into(),
        name: "SEO retainer".into(),
        price: 8_000,
        duration_label: "1 month".into(),
    })?;

    // Alice pays by installment on the default 30/70 schedule.
    engine.set_installment_policy(&alice.account_id, true, &[], &admin.account_id)?;
    let installment = engine.create_payment(
        &alice.account_id,
        "svc-website",
        PaymentKind::Installment,
        "DEMO-TXN-1",
    )?;
    engine.adjudicate_tranche(&installment.payment_id, 1, Decision::Approved, None)?;

    // Bob pays in full, still awaiting verification.
    engine.create_payment(&bob.account_id, "svc-seo", PaymentKind::Full, "DEMO-TXN-2")?;

    println!("seeded demo data:");
    println!("  admin:    {}", admin.account_id);
    println!("  alice:    {} (installment, tranche 1 approved)", alice.account_id);
    println!("  bob:      {} (full, pending)", bob.account_id);
    println!("  payment:  {}", installment.payment_id);
    println!();
    Ok(())
}

fn print_summary(engine: &ReconEngine) -> Result<()> {
    let stats = engine.payment_stats()?;
    let suspicious = engine.store.count_suspicious_accounts()?;
    let now = Utc::now();

    println!("=== PORTFOLIO SUMMARY ===");
    println!("  payments:    {}", stats.total);
    println!("  pending:     {}", stats.pending);
    println!("  partial:     {}", stats.partial);
    println!("  approved:    {}", stats.approved);
    println!("  rejected:    {}", stats.rejected);
    println!("  recognized:  {}", stats.amount_recognized);
    println!("  suspicious:  {suspicious}");

    let payments = engine.store.all_payments()?;
    if payments.is_empty() {
        return Ok(());
    }

    println!();
    println!("=== PAYMENTS ===");
    for p in &payments {
        let phase = engine.entitlement_phase(&p.payment_id, now)?;
        println!(
            "  {} | {} | {} | paid {}/{} | phase {}",
            p.payment_id,
            p.kind.as_str(),
            p.status.as_str(),
            p.amount_paid,
            p.amount,
            phase.as_str()
        );
    }
    Ok(())
}
