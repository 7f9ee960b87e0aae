//! Helper macros for the variadic entry points.
//!
//! Both macros take the `...` argument list by expression so the unstable
//! `VaListImpl` type never has to be named.

/// Pull the arguments a format string consumes out of `$args` as tagged
/// [`FormatArg`](rlibc_core::stdio::FormatArg) values.
///
/// ```ignore
/// let slots = util::format_slots(fmt)?;
/// let args = va_format_args!(&slots, args);
/// ```
#[allow(unused_macros)]
macro_rules! va_format_args {
    ($slots:expr, $args:expr) => {{
        use rlibc_core::stdio::FormatArg;
        use $crate::util::VaSlot;
        let mut out = Vec::with_capacity($slots.len());
        for slot in $slots {
            out.push(match slot {
                VaSlot::Int => FormatArg::Int(i64::from(unsafe { $args.next_arg::<::std::ffi::c_int>() })),
                VaSlot::Long => FormatArg::Int(unsafe { $args.next_arg::<i64>() }),
                VaSlot::Uint => {
                    FormatArg::Uint(u64::from(unsafe { $args.next_arg::<::std::ffi::c_uint>() }))
                }
                VaSlot::Ulong => FormatArg::Uint(unsafe { $args.next_arg::<u64>() }),
                VaSlot::Char => FormatArg::Char(unsafe { $args.next_arg::<::std::ffi::c_int>() } as u8),
                VaSlot::Double => FormatArg::Float(unsafe { $args.next_arg::<f64>() }),
                VaSlot::CStr => FormatArg::Str(unsafe {
                    $crate::util::c_bytes_opt($args.next_arg::<*const ::std::ffi::c_char>())
                }),
                VaSlot::Pointer => {
                    FormatArg::Pointer(unsafe { $args.next_arg::<*const ::std::ffi::c_void>() } as usize)
                }
            });
        }
        out
    }};
}

/// Write each assigned scan item through the next pointer in `$args`.
/// Null destinations are skipped.
#[allow(unused_macros)]
macro_rules! va_store_scan {
    ($items:expr, $args:expr) => {{
        for item in $items {
            let dst = unsafe { $args.next_arg::<*mut ::std::ffi::c_void>() };
            if !dst.is_null() {
                unsafe { $crate::util::store_scan_item(dst, item) };
            }
        }
    }};
}
