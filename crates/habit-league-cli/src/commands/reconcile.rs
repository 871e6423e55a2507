use clap::Subcommand;

use super::{open_tracker, print_json, CommandResult};

#[derive(Subcommand)]
pub enum ReconcileAction {
    /// Charge the current league's upkeep once
    Tick,
    /// Charge upkeep on the configured interval until Ctrl-C
    Run,
}

pub fn run(action: ReconcileAction) -> CommandResult {
    let tracker = open_tracker()?;

    match action {
        ReconcileAction::Tick => print_json(&tracker.reconcile_once()?),
        ReconcileAction::Run => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async {
                let poller = tracker.poller();
                let mut updates = poller.subscribe();
                poller.start();
                println!("Reconciling, press Ctrl-C to stop");

                loop {
                    tokio::select! {
                        signal = tokio::signal::ctrl_c() => {
                            signal?;
                            break;
                        }
                        changed = updates.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let points = updates.borrow_and_update().points;
                            let league = tracker.league_table().current_league(points);
                            println!("Points: {points} ({})", league.title);
                        }
                    }
                }

                poller.stop().await;
                Ok::<(), Box<dyn std::error::Error>>(())
            })
        }
    }
}
